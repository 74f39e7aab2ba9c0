use std::path::Path;

use duetto_bridge::{MessageFromBackend, notification::NotificationType};
use tokio::sync::oneshot;

use crate::session::SessionCommand;

const TELEMETRY_FILE_NAME: &str = "telemetry.json";

/// Handles [`duetto_bridge::MessageToBackend::TelemetryExportRequest`].
pub async fn handle_telemetry_export(context: super::AppContextHandle) {
    let (reply_tx, reply_rx) = oneshot::channel();
    context
        .forward(SessionCommand::ExportTelemetry(reply_tx))
        .await;

    match reply_rx.await {
        Ok(Ok(json)) => {
            let cache_path = context.state.read().await.cache_path.clone();
            if let Err(err) = write_last_export(&cache_path, &json).await {
                log::warn!("Failed to keep a copy of the telemetry export: {err}");
            }
            context
                .send(MessageFromBackend::TelemetryExportResponse(json))
                .await;
        }
        Ok(Err(err)) => {
            log::error!("Failed to export telemetry: {err}");
            context
                .send_notification(NotificationType::Error, "Telemetry could not be exported.")
                .await;
        }
        Err(_) => log::warn!("Engine session ended before exporting telemetry"),
    }
}

/// Keeps the latest export next to the other cached data, so it survives a
/// host that drops the response.
async fn write_last_export(cache_path: &Path, json: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(cache_path).await?;
    let path = cache_path.join(TELEMETRY_FILE_NAME);
    tokio::fs::write(&path, json).await?;
    log::info!("Telemetry written to {path:?}");
    Ok(())
}

/// Disposes of the session: stops the capture transport, then the engine.
/// Calling it again after a completed shutdown does nothing.
pub async fn handle_shutdown(context: super::AppContextHandle) {
    super::transport_service::stop_transport(&context).await;

    let session = context.state.write().await.session.take();
    let Some(session) = session else {
        return;
    };
    session.shutdown().await;

    log::info!("Session shut down");
    context.send(MessageFromBackend::ShutdownCompleted).await;
}

use duetto_bridge::{
    MessageFromBackend,
    config::{Config, ManualMode},
    notification::NotificationType,
};

use crate::session::SessionCommand;

/// Handles an incoming configuration request (see
/// [`duetto_bridge::MessageToBackend::ConfigurationRequest`]).
pub async fn handle_config_request(context: super::AppContextHandle) {
    let config = {
        let state = context.state.read().await;
        state.config.clone()
    };
    context
        .send(MessageFromBackend::ConfigurationResponse(config))
        .await;
}

/// Replaces the configuration, hands it to the engine and persists it.
///
/// Changes to the block geometry restart a running capture transport so the
/// pump slices blocks of the new size.
pub async fn handle_update_configuration(context: super::AppContextHandle, config: Config) {
    let (geometry_changed, transport_running) = {
        let mut state = context.state.write().await;
        let geometry_changed = state.config.engine != config.engine;
        if state.config.models.vad_model_path != config.models.vad_model_path
            || state.config.models.pitch_model_path != config.models.pitch_model_path
        {
            log::info!("Model paths changed, new models are loaded on the next start");
        }

        state.config = config.clone();
        if let Err(err) = crate::config::save_config(&state.config).await {
            log::error!("Failed to persist configuration: {err}");
            context
                .send_notification(NotificationType::Warning, "Settings could not be saved.")
                .await;
        }
        (geometry_changed, state.transport.is_some())
    };

    context
        .forward(SessionCommand::ApplyConfig(Box::new(config)))
        .await;

    if geometry_changed && transport_running {
        super::transport_service::restart_transport(context).await;
    }
}

/// Switches the gate's manual override and remembers it.
pub async fn handle_manual_mode(context: super::AppContextHandle, mode: ManualMode) {
    {
        let mut state = context.state.write().await;
        state.config.tuning.manual_mode = mode;
        if let Err(err) = crate::config::save_config(&state.config).await {
            log::error!("Failed to persist manual mode: {err}");
        }
    }
    log::info!("Manual mode set to {mode:?}");
    context.forward(SessionCommand::SetManualMode(mode)).await;
}

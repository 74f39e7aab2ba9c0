use duetto_bridge::{
    MessageFromBackend,
    media::{TrackBuffer, TrackKind},
    notification::NotificationType,
};
use duetto_engine::track::MonoTrack;

use crate::session::SessionCommand;

/// Handles [`duetto_bridge::MessageToBackend::LoadTrack`]: conforms the
/// decoded buffer to the engine rate off the async threads and hands it to
/// the session.
///
/// A buffer that cannot be conformed is reported to the host and replaced by
/// a silent track, so playback keeps working with the other track.
pub async fn handle_load_track(
    context: super::AppContextHandle,
    kind: TrackKind,
    buffer: TrackBuffer,
) {
    let engine_rate = context.state.read().await.config.engine.sample_rate;
    let source_rate = buffer.sample_rate;
    let frames = buffer.frames();

    let conformed =
        match tokio::task::spawn_blocking(move || MonoTrack::conform(&buffer, engine_rate)).await {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(err) => Err(format!("conversion task failed: {err}")),
        };

    let track = match conformed {
        Ok(track) => {
            log::info!(
                "Loaded {kind:?} track: {frames} frames at {source_rate} Hz, {:.2} s",
                track.duration_seconds()
            );
            track
        }
        Err(err) => {
            log::error!("Failed to load {kind:?} track: {err}");
            context
                .send_notification(
                    NotificationType::Error,
                    format!("The {} track could not be loaded: {err}", kind_label(kind)),
                )
                .await;
            MonoTrack::silent(engine_rate)
        }
    };

    let duration_seconds = track.duration_seconds();
    context
        .forward(SessionCommand::LoadTrack(kind, track))
        .await;
    context
        .send(MessageFromBackend::TrackLoaded {
            kind,
            duration_seconds,
        })
        .await;
}

fn kind_label(kind: TrackKind) -> &'static str {
    match kind {
        TrackKind::Instrument => "instrument",
        TrackKind::Guide => "guide",
    }
}

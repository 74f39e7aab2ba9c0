//! Application context and message dispatching utilities.
//!
//! The context contains the shared state and provides helpers for sending
//! responses and notifications back to the host bridge.

use std::sync::Arc;

use duetto_bridge::{MessageFromBackend, MessageToBackend, notification::NotificationType};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::services;
use crate::session::{SessionCommand, SessionHandle};
use crate::state::SharedState;

/// Shared application context passed to services and message handlers.
pub(crate) struct AppContext {
    /// Mutable runtime application state shared across services.
    pub state: SharedState,
    /// Outbound channel to the host bridge.
    pub tx: Sender<MessageFromBackend>,
}

impl AppContext {
    /// Read and dispatch messages from the host bridge until it closes.
    pub async fn consume_bridge_messages(self: &Arc<Self>, mut rx: Receiver<MessageToBackend>) {
        while let Some(message) = rx.recv().await {
            log::debug!("Got a host message: {message:?}");
            self.dispatch_message(message).await;
        }

        // the host went away without asking, clean up anyway
        services::session_service::handle_shutdown(self.clone()).await;
        log::info!("Host bridge closed, backend is exiting");
    }

    /// Dispatches the received message from the host down to individual
    /// service handlers.
    async fn dispatch_message(self: &Arc<Self>, message: MessageToBackend) {
        match message {
            MessageToBackend::ConfigurationRequest => {
                services::config_service::handle_config_request(self.clone()).await;
            }
            MessageToBackend::UpdateConfiguration(config) => {
                services::config_service::handle_update_configuration(self.clone(), config).await;
            }
            MessageToBackend::SetManualMode(mode) => {
                services::config_service::handle_manual_mode(self.clone(), mode).await;
            }
            MessageToBackend::AudioDevicesListRequest => {
                services::audio_service::handle_audio_devices_list_request(self.clone()).await;
            }
            MessageToBackend::SelectAudioDevice(id) => {
                services::audio_service::handle_audio_device_selection(self.clone(), id).await;
            }
            MessageToBackend::StartEngineRequest => {
                services::transport_service::handle_start_engine_request(self.clone()).await;
            }
            MessageToBackend::LoadTrack(kind, buffer) => {
                services::track_service::handle_load_track(self.clone(), kind, buffer).await;
            }
            MessageToBackend::Play => self.forward(SessionCommand::Play).await,
            MessageToBackend::Pause => self.forward(SessionCommand::Pause).await,
            MessageToBackend::Stop => self.forward(SessionCommand::Stop).await,
            MessageToBackend::Seek(seconds) => self.forward(SessionCommand::Seek(seconds)).await,
            MessageToBackend::SetGuideMute(muted) => {
                self.forward(SessionCommand::SetGuideMute(muted)).await;
            }
            MessageToBackend::StartCalibration { duration_seconds } => {
                self.forward(SessionCommand::StartCalibration(duration_seconds))
                    .await;
            }
            MessageToBackend::TelemetryExportRequest => {
                services::session_service::handle_telemetry_export(self.clone()).await;
            }
            MessageToBackend::Shutdown => {
                services::session_service::handle_shutdown(self.clone()).await;
            }
        }
    }

    /// Returns the session handle, or notifies the host that the session is
    /// gone.
    pub async fn session(&self) -> Option<SessionHandle> {
        let session = self.state.read().await.session.clone();
        if session.is_none() {
            self.send_notification(NotificationType::Warning, "The session has been shut down.")
                .await;
        }
        session
    }

    /// Forwards a command to the engine session.
    pub async fn forward(&self, command: SessionCommand) {
        if let Some(session) = self.session().await
            && !session.command(command).await
        {
            log::warn!("Engine session is no longer running");
        }
    }

    /// Send a message to the host bridge.
    pub async fn send(&self, message: MessageFromBackend) {
        if self.tx.send(message).await.is_err() {
            log::warn!("Host bridge is closed, dropping a backend message");
        }
    }

    /// Send a notification message to the host bridge.
    pub async fn send_notification(
        &self,
        notification_type: NotificationType,
        content: impl Into<String>,
    ) {
        self.send(MessageFromBackend::NotificationMessage(
            duetto_bridge::notification::NotificationMessage::new(notification_type, content),
        ))
        .await;
    }
}

//! Communication bridge between the host and the vocal-assist backend.
//!
//! This crate defines the types and protocols used to connect a host (a UI,
//! a command line, or a plugin shell) with the asynchronous backend that owns
//! the real-time audio engine.
//!
//! - The host sends commands (load tracks, control playback, apply tuning).
//! - The backend pushes events (meters, notifications, calibration results).
//! - Mix parameters for the playback graph travel over a separate
//!   [`tokio::sync::watch`] channel, since only the latest value matters.
//!
//! Command and event channels are bounded [`tokio::sync::mpsc`] channels
//! wrapped in [`BridgeChannels`].

pub mod audio;
pub mod config;
pub mod media;
pub mod notification;

use tokio::sync::{
    mpsc::{self, Receiver, Sender},
    watch,
};

/// Messages emitted by the backend to inform the host of state updates.
#[derive(Debug, Clone)]
pub enum MessageFromBackend {
    /// Generic message for all notifications in the application.
    NotificationMessage(notification::NotificationMessage),
    /// Response to the configuration request from the host.
    ConfigurationResponse(config::Config),
    AudioDevicesListResponse(Vec<audio::InputDevice>),
    /// The capture transport is running and blocks are flowing.
    EngineStartedResponse,
    /// A reference track was conformed and handed to the engine.
    TrackLoaded {
        kind: media::TrackKind,
        duration_seconds: f64,
    },
    /// The guide pitch contour of the latest guide load is available.
    GuideAnalysisCompleted { hops: usize },
    /// Periodic meter values.
    MeterUpdate(media::MeterSnapshot),
    CalibrationCompleted(media::CalibrationResult),
    /// Serialized telemetry ring, as JSON.
    TelemetryExportResponse(String),
    /// The session is disposed; no further blocks will be processed.
    ShutdownCompleted,
}

/// Commands issued by the host to control or query the backend.
#[derive(Debug, Clone)]
pub enum MessageToBackend {
    /// Request for the application configuration.
    ConfigurationRequest,
    /// Replace the configuration, apply it to the engine and persist it.
    UpdateConfiguration(config::Config),
    SetManualMode(config::ManualMode),
    AudioDevicesListRequest,
    SelectAudioDevice(String),
    /// Open the capture device and start feeding the engine.
    StartEngineRequest,
    LoadTrack(media::TrackKind, media::TrackBuffer),
    Play,
    Pause,
    Stop,
    /// Move the shared playback cursor, in seconds.
    Seek(f64),
    SetGuideMute(bool),
    StartCalibration { duration_seconds: f32 },
    TelemetryExportRequest,
    /// Dispose of the session: stop background work and the transport.
    Shutdown,
}

/// Paired channels for bidirectional communication between host and backend,
/// plus the mix parameter feed for the playback graph.
pub struct BridgeChannels {
    /// Receiver used by the host to get messages from the backend.
    pub frontend_rx: Receiver<MessageFromBackend>,
    /// Sender used by the host to send commands to the backend.
    pub frontend_tx: Sender<MessageToBackend>,

    /// Receiver used by the backend to get commands from the host.
    pub backend_rx: Receiver<MessageToBackend>,
    /// Sender used by the backend to send events/responses to the host.
    pub backend_tx: Sender<MessageFromBackend>,

    /// Latest mix parameters, published by the backend after every block.
    pub mix_tx: watch::Sender<media::MixParameters>,
    /// Latest mix parameters, read by the playback graph.
    pub mix_rx: watch::Receiver<media::MixParameters>,
}

impl BridgeChannels {
    /// Creates a new pair of bridged channels with the given buffer capacity.
    pub fn new(buffer: usize) -> Self {
        let (to_backend_tx, to_backend_rx) = mpsc::channel(buffer);
        let (to_frontend_tx, to_frontend_rx) = mpsc::channel(buffer);
        let (mix_tx, mix_rx) = watch::channel(media::MixParameters::default());
        Self {
            frontend_tx: to_backend_tx,
            frontend_rx: to_frontend_rx,
            backend_rx: to_backend_rx,
            backend_tx: to_frontend_tx,
            mix_tx,
            mix_rx,
        }
    }
}

impl Default for BridgeChannels {
    fn default() -> Self {
        Self::new(64)
    }
}

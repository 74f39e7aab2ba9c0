use std::sync::Arc;

use duetto_audio::device::HostInputDevice;

use crate::{services::transport_service::CaptureTransport, session::SessionHandle};

/// The core application state that holds configuration, the selected audio
/// device, and handles to the running session and capture transport.
///
/// It is designed to be wrapped in thread-safe, async-friendly concurrency
/// primitives (see [`SharedState`]) to allow safe concurrent reads and
/// occasional writes from multiple tasks. The engine itself is not part of
/// the state: it lives inside the session task.
pub struct State {
    /// The loaded application configuration.
    pub config: duetto_bridge::config::Config,
    /// Path to the directory used for caching data across runs.
    pub cache_path: std::path::PathBuf,
    pub active_host: Arc<cpal::Host>,
    /// Device the capture transport opens; the host default when unset.
    pub active_audio_device: Option<HostInputDevice>,
    /// Running capture transport, if the engine has been started.
    pub transport: Option<CaptureTransport>,
    /// Handle to the engine session task, `None` once shut down.
    pub session: Option<SessionHandle>,
}

/// Thread-safe, async-friendly shared reference to the application [`State`].
pub type SharedState = std::sync::Arc<tokio::sync::RwLock<State>>;

//! Backend service handlers for host-driven requests.
//!
//! This module groups async request handlers that operate on the shared
//! `AppContext`, perform side effects (devices, filesystem, background
//! conversion), and emit responses or notifications back to the host.

pub mod audio_service;
pub mod config_service;
pub mod session_service;
pub mod track_service;
pub mod transport_service;

/// Represents a type that is used in all handlers as an application context.
pub(crate) type AppContextHandle = std::sync::Arc<crate::AppContext>;

//! Backend runtime entry point and public API surface.
//!
//! This crate owns the backend lifecycle, routes bridge messages to services,
//! runs the engine session task, and manages shared state used by
//! asynchronous tasks.

mod app;
mod config;
mod models;
mod runtime;
mod services;
mod session;
mod state;

pub(crate) use crate::app::AppContext;
pub use crate::runtime::{BackendError, run};

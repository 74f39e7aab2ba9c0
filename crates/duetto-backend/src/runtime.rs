//! Backend runtime setup and orchestration.
//!
//! This module wires together configuration, shared state, the engine
//! session, and the message dispatch loop that listens to host requests.

use std::{sync::Arc, thread, time::Duration};

use duetto_bridge::{MessageFromBackend, MessageToBackend, media::MixParameters};
use duetto_engine::AudioEngine;
use duetto_inference::{InferenceError, worker::InferenceClient};
use tokio::sync::{
    RwLock,
    mpsc::{Receiver, Sender},
    watch,
};

use crate::app::AppContext;
use crate::config::ConfigError;
use crate::state::State;

/// Errors that prevent the backend from starting.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to start the inference worker: {0}")]
    Inference(#[from] InferenceError),
    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Initialize backend state and start processing host messages.
async fn setup_backend(
    rx: Receiver<MessageToBackend>,
    tx: Sender<MessageFromBackend>,
    mix_tx: watch::Sender<MixParameters>,
) -> Result<(), BackendError> {
    let (config, cache_path) = crate::config::load_config().await?;

    let active_host = Arc::new(cpal::default_host()); // using default host for now
    let active_audio_device = match config.audio_device_config.selected_device_id {
        Some(ref device_id) => {
            match duetto_audio::device::get_device_by_id(&active_host, device_id) {
                Ok(device) => device,
                Err(err) => {
                    log::warn!("Stored audio device {device_id} is unusable: {err}");
                    None
                }
            }
        }
        None => None,
    };

    let models = crate::models::load_models(&config.models);
    let inference = InferenceClient::spawn(
        models,
        Duration::from_millis(config.engine.inference_timeout_ms),
    )?;
    let engine = AudioEngine::new(&config, inference);
    if let Some(calibration) = config.calibration {
        log::info!(
            "Resuming with calibrated vocal peak of {:.1} dB",
            calibration.vocal_peak_db
        );
    }

    let state = Arc::new(RwLock::new(State {
        config,
        cache_path,
        active_host,
        active_audio_device,
        transport: None,
        session: None,
    }));

    let context = Arc::new(AppContext { state, tx });
    let session = crate::session::spawn_session(engine, context.clone(), mix_tx);
    context.state.write().await.session = Some(session);

    context.consume_bridge_messages(rx).await;
    Ok(())
}

/// Spawn the backend runtime and begin processing bridge messages.
///
/// The returned handle finishes once the host has dropped its command sender
/// and the backend has shut down.
pub fn run(
    rx: Receiver<MessageToBackend>,
    tx: Sender<MessageFromBackend>,
    mix_tx: watch::Sender<MixParameters>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let result = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(BackendError::from)
            .and_then(|runtime| runtime.block_on(setup_backend(rx, tx, mix_tx)));

        if let Err(err) = result {
            log::error!("Backend stopped: {err}");
        }
    })
}

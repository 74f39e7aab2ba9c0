//! Capture transport: microphone → mono → engine rate → N-sample blocks.
//!
//! The cpal stream lives on its own thread, since streams are not `Send` on
//! every platform. Its callback mixes to mono, resamples to the engine rate
//! and pushes samples into a ring buffer. A blocking pump pops the ring,
//! slices exact blocks and hands them to the engine session.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use cpal::traits::StreamTrait;
use duetto_audio::{
    device::{DeviceError, HostInputDevice},
    resampler::{AudioResampler, ResamplerError, StreamingResampler},
};
use duetto_bridge::{MessageFromBackend, notification::NotificationType};
use ringbuf_blocking::{
    BlockingHeapRb,
    traits::{Consumer, Producer, Split},
};
use tokio::sync::{mpsc, oneshot};

/// Pause of the pump when the ring is empty.
const PUMP_IDLE: Duration = Duration::from_millis(1);
/// How often the stream thread checks whether it should stop.
const STREAM_POLL: Duration = Duration::from_millis(100);

/// Errors that can occur while starting the capture transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("failed to construct capture resampler: {0}")]
    Resampler(#[from] ResamplerError),
    #[error("failed to start the input stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
    #[error("failed to spawn the stream thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("the stream thread exited before the stream started")]
    StreamThreadGone,
    #[error("the engine session is not running")]
    SessionGone,
}

/// A running capture transport. Dropping it without [`stop`](Self::stop)
/// leaves the stream running.
pub struct CaptureTransport {
    running: Arc<AtomicBool>,
    stream_thread: thread::JoinHandle<()>,
    device: String,
}

impl CaptureTransport {
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Stops the stream and the pump. Both exit on their own shortly after.
    pub fn stop(self) {
        self.running.store(false, Ordering::Release);
        self.stream_thread.thread().unpark();
        log::info!("Capture transport on {} stopped", self.device);
    }
}

/// Handles [`duetto_bridge::MessageToBackend::StartEngineRequest`].
pub async fn handle_start_engine_request(context: super::AppContextHandle) {
    let already_running = {
        let state = context.state.read().await;
        state.transport.as_ref().map(|transport| transport.device().to_string())
    };
    if let Some(device) = already_running {
        log::info!("Capture transport is already running on {device}");
        context.send(MessageFromBackend::EngineStartedResponse).await;
        return;
    }

    match start_transport(&context).await {
        Ok(transport) => {
            log::info!("Capture transport started on {}", transport.device());
            context.state.write().await.transport = Some(transport);
            context.send(MessageFromBackend::EngineStartedResponse).await;
        }
        Err(err) => {
            log::error!("Failed to start the capture transport: {err}");
            context
                .send_notification(
                    NotificationType::Error,
                    format!("Could not start audio capture: {err}"),
                )
                .await;
        }
    }
}

/// Stops a running transport and starts a new one with the current device
/// and configuration.
pub async fn restart_transport(context: super::AppContextHandle) {
    let previous = context.state.write().await.transport.take();
    if let Some(transport) = previous {
        transport.stop();
    }
    handle_start_engine_request(context).await;
}

/// Stops the running transport, if any.
pub async fn stop_transport(context: &super::AppContextHandle) {
    let transport = context.state.write().await.transport.take();
    if let Some(transport) = transport {
        transport.stop();
    }
}

async fn start_transport(
    context: &super::AppContextHandle,
) -> Result<CaptureTransport, TransportError> {
    let (engine_config, device, host, session) = {
        let state = context.state.read().await;
        (
            state.config.engine.clone(),
            state.active_audio_device.clone(),
            state.active_host.clone(),
            state.session.clone(),
        )
    };
    let session = session.ok_or(TransportError::SessionGone)?;
    let device = match device {
        Some(device) => device,
        None => duetto_audio::device::default_input_device(&host)?,
    };

    let engine_rate = engine_config.sample_rate;
    let block_size = engine_config.block_size.max(1);
    let (device_rate, channels) = device.sample_rate_and_channels()?;
    let buffer_frames = device.target_buffer_size(engine_rate, block_size as u32)?;
    log::info!(
        "Input device {device} runs at {device_rate} Hz with {channels} channel(-s), buffer of {buffer_frames} frames"
    );

    let resampler = StreamingResampler::<f32>::new(device_rate, engine_rate, buffer_frames)
        .map_err(ResamplerError::from)?;
    let ring = BlockingHeapRb::<f32>::new(engine_rate.max(block_size as u32) as usize);
    let (producer, consumer) = ring.split();
    let running = Arc::new(AtomicBool::new(true));

    spawn_pump(consumer, block_size, session.block_sender(), running.clone());

    let (started_tx, started_rx) = oneshot::channel();
    let stream_running = running.clone();
    let stream_device = device.clone();
    let stream_thread = thread::Builder::new()
        .name("capture-stream".into())
        .spawn(move || {
            run_stream(
                stream_device,
                buffer_frames,
                channels as usize,
                resampler,
                producer,
                stream_running,
                started_tx,
            );
        })?;

    let device = device.to_string();
    match started_rx.await {
        Ok(Ok(())) => Ok(CaptureTransport {
            running,
            stream_thread,
            device,
        }),
        Ok(Err(err)) => {
            running.store(false, Ordering::Release);
            Err(err)
        }
        Err(_) => {
            running.store(false, Ordering::Release);
            Err(TransportError::StreamThreadGone)
        }
    }
}

/// Owns the cpal stream until `running` is cleared.
fn run_stream<P>(
    device: HostInputDevice,
    buffer_frames: u32,
    channels: usize,
    mut resampler: StreamingResampler<f32>,
    mut producer: P,
    running: Arc<AtomicBool>,
    started: oneshot::Sender<Result<(), TransportError>>,
) where
    P: Producer<Item = f32> + Send + 'static,
{
    let mut mono = vec![0.0f32; buffer_frames as usize];
    let mut push_resampled = move |chunk: &[f32]| {
        // a full ring means the pump fell behind, the newest samples are lost
        producer.push_slice(chunk);
    };

    let stream = duetto_audio::device::open_cpal_input_stream(
        &device,
        buffer_frames,
        move |data: &[f32]| {
            let frames = data.len() / channels.max(1);
            if frames > mono.len() {
                log::warn!(
                    "Resizing the mono buffer on the audio thread from {} to {frames}",
                    mono.len()
                );
                mono.resize(frames, 0.0);
            }

            let written =
                duetto_audio::mixer::mix_interleaved_to_mono(&mut mono, data, channels);
            if let Err(err) = resampler.process_callback(&mono[..written], &mut push_resampled) {
                log::error!("Capture resampler failed: {err}");
            }
        },
        |error| {
            log::error!("An error occurred while processing the input stream data: {error}");
        },
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            let _ = started.send(Err(err.into()));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = started.send(Err(err.into()));
        return;
    }
    if started.send(Ok(())).is_err() {
        return;
    }

    while running.load(Ordering::Acquire) {
        thread::park_timeout(STREAM_POLL);
    }
    drop(stream);
}

/// Pops resampled samples from the ring and forwards exact `block_size`
/// blocks to the session.
fn spawn_pump<C>(
    mut consumer: C,
    block_size: usize,
    blocks: mpsc::Sender<Vec<f32>>,
    running: Arc<AtomicBool>,
) where
    C: Consumer<Item = f32> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut scratch = vec![0.0f32; block_size];
        let mut pending: Vec<f32> = Vec::with_capacity(block_size * 2);
        let mut lost_blocks = 0u64;

        while running.load(Ordering::Acquire) {
            let len = consumer.pop_slice(&mut scratch);
            if len == 0 {
                thread::sleep(PUMP_IDLE);
                continue;
            }

            pending.extend_from_slice(&scratch[..len]);
            while pending.len() >= block_size {
                let block: Vec<f32> = pending.drain(..block_size).collect();
                match blocks.try_send(block) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        lost_blocks += 1;
                        log::warn!(
                            "Session is saturated, dropped {lost_blocks} block(s) at the pump"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        log::info!("Engine session closed, stopping the block pump");
                        running.store(false, Ordering::Release);
                        return;
                    }
                }
            }
        }
    });
}

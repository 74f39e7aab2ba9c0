//! Dedicated inference thread.
//!
//! The models are synchronous and may take a while, so they live on their own
//! OS thread and are driven through a bounded request channel. Callers hold a
//! cloneable [`InferenceClient`] and await replies with a bounded wait; a
//! request that misses its deadline resolves to [`InferenceError::Timeout`]
//! and its late reply is discarded.

use std::{thread, time::Duration};

use tokio::sync::{mpsc, oneshot};

use crate::{
    InferenceError, PitchSalienceModel, VoiceActivityModel,
    vad::{VadOutput, VadState},
};

/// Maximum number of requests waiting for the worker.
const REQUEST_QUEUE_CAPACITY: usize = 16;

enum InferenceRequest {
    Vad {
        frame: Vec<f32>,
        state: VadState,
        reply: oneshot::Sender<Result<VadOutput, InferenceError>>,
    },
    Pitch {
        frame: Vec<f32>,
        reply: oneshot::Sender<Result<Vec<f32>, InferenceError>>,
    },
}

/// The models owned by the worker thread.
pub struct ModelSet {
    pub vad: Box<dyn VoiceActivityModel>,
    pub pitch: Box<dyn PitchSalienceModel>,
    /// Sample rate tag passed to the voice-activity model.
    pub sample_rate: u32,
}

/// Handle used to submit frames to the inference thread.
#[derive(Clone)]
pub struct InferenceClient {
    tx: mpsc::Sender<InferenceRequest>,
    timeout: Duration,
}

impl InferenceClient {
    /// Starts the inference thread with `models` and returns a client for it.
    ///
    /// The thread exits once every client has been dropped.
    pub fn spawn(models: ModelSet, timeout: Duration) -> Result<Self, InferenceError> {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        thread::Builder::new()
            .name("inference".into())
            .spawn(move || run_worker(models, rx))?;

        Ok(Self { tx, timeout })
    }

    /// Bound applied to every request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the voice-activity model on `frame` with the given recurrent state.
    pub async fn detect_voice(
        &self,
        frame: Vec<f32>,
        state: VadState,
    ) -> Result<VadOutput, InferenceError> {
        let (reply, response) = oneshot::channel();
        self.request(InferenceRequest::Vad { frame, state, reply }, response).await
    }

    /// Runs the pitch model on `frame` and returns its raw salience vector.
    pub async fn pitch_salience(&self, frame: Vec<f32>) -> Result<Vec<f32>, InferenceError> {
        let (reply, response) = oneshot::channel();
        self.request(InferenceRequest::Pitch { frame, reply }, response).await
    }

    async fn request<T>(
        &self,
        request: InferenceRequest,
        response: oneshot::Receiver<Result<T, InferenceError>>,
    ) -> Result<T, InferenceError> {
        let exchange = async {
            self.tx.send(request).await.map_err(|_| InferenceError::WorkerGone)?;
            response.await.map_err(|_| InferenceError::WorkerGone)?
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout),
        }
    }
}

fn run_worker(mut models: ModelSet, mut rx: mpsc::Receiver<InferenceRequest>) {
    log::debug!("Inference worker started");
    let sample_rate = i64::from(models.sample_rate);

    while let Some(request) = rx.blocking_recv() {
        match request {
            InferenceRequest::Vad { frame, state, reply } => {
                // a closed reply means the caller already gave up on this frame
                if reply.is_closed() {
                    continue;
                }
                let _ = reply.send(models.vad.infer(&frame, &state, sample_rate));
            }
            InferenceRequest::Pitch { frame, reply } => {
                if reply.is_closed() {
                    continue;
                }
                let _ = reply.send(models.pitch.salience(&frame));
            }
        }
    }

    log::debug!("Inference worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SALIENCE_BINS, UnavailableModel};

    struct EchoVad;

    impl VoiceActivityModel for EchoVad {
        fn infer(
            &mut self,
            frame: &[f32],
            state: &VadState,
            sample_rate: i64,
        ) -> Result<VadOutput, InferenceError> {
            assert_eq!(sample_rate, 16_000);
            let next: Vec<f32> = state.as_slice().iter().map(|value| value + 1.0).collect();
            Ok(VadOutput {
                probability: frame.first().copied().unwrap_or(0.0),
                state: VadState::from(next),
            })
        }
    }

    struct SlowPitch(Duration);

    impl PitchSalienceModel for SlowPitch {
        fn salience(&mut self, _: &[f32]) -> Result<Vec<f32>, InferenceError> {
            thread::sleep(self.0);
            Ok(vec![0.0; SALIENCE_BINS])
        }
    }

    fn client(pitch_delay: Duration, timeout: Duration) -> InferenceClient {
        InferenceClient::spawn(
            ModelSet {
                vad: Box::new(EchoVad),
                pitch: Box::new(SlowPitch(pitch_delay)),
                sample_rate: 16_000,
            },
            timeout,
        )
        .expect("worker should start")
    }

    #[tokio::test]
    async fn voice_requests_round_trip_state() {
        let client = client(Duration::ZERO, Duration::from_secs(1));
        let output = client
            .detect_voice(vec![0.75; 160], VadState::zeroed(3))
            .await
            .expect("request should succeed");

        assert_eq!(output.probability, 0.75);
        assert_eq!(output.state.as_slice(), &[1.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn slow_models_time_out() {
        let client = client(Duration::from_millis(200), Duration::from_millis(20));
        let result = client.pitch_salience(vec![0.0; 1024]).await;
        assert!(matches!(result, Err(InferenceError::Timeout)));
    }

    #[tokio::test]
    async fn unavailable_models_report_errors() {
        let client = InferenceClient::spawn(
            ModelSet {
                vad: Box::new(UnavailableModel::new("vad")),
                pitch: Box::new(UnavailableModel::new("pitch")),
                sample_rate: 16_000,
            },
            Duration::from_secs(1),
        )
        .expect("worker should start");

        let result = client.pitch_salience(vec![0.0; 1024]).await;
        assert!(matches!(result, Err(InferenceError::ModelUnavailable("pitch"))));
    }
}

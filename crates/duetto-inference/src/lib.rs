//! Voice-activity and pitch feature extraction.
//!
//! The models themselves are opaque; this crate only fixes their contracts:
//! - A voice-activity model takes a frame at the model rate plus a recurrent
//!   state tensor and returns a probability and the updated state.
//! - A pitch model takes a frame at the model rate and returns a salience
//!   vector over [`SALIENCE_BINS`] cents-spaced bins.
//!
//! Models run on a dedicated [`worker`] so that block processing only ever
//! awaits a reply, with a bounded wait. Failures never escape to the caller
//! as panics: the extractors in [`vad`] and [`pitch`] turn them into safe
//! defaults and log each model's first failure once.

#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pitch;
pub mod vad;
pub mod worker;

use crate::vad::{VadOutput, VadState};

/// Number of bins in a pitch salience vector.
pub const SALIENCE_BINS: usize = 360;

/// Errors produced by model calls and by the inference worker.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// No model is loaded for this feature.
    #[error("{0} model is not available")]
    ModelUnavailable(&'static str),
    /// The model runtime rejected the call.
    #[error("model call failed: {0}")]
    Model(String),
    /// The model returned something that does not fit its contract.
    #[error("malformed model output: {0}")]
    Malformed(String),
    /// The reply did not arrive within the configured bound.
    #[error("inference timed out")]
    Timeout,
    /// The worker has shut down.
    #[error("inference worker is gone")]
    WorkerGone,
    /// The worker thread could not be started.
    #[error("failed to start inference worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A stateful voice-activity model.
pub trait VoiceActivityModel: Send {
    /// Runs one frame through the model.
    ///
    /// `state` is the recurrent state produced by the previous call (zeroed
    /// at session start); `sample_rate` is the tag the model expects for the
    /// frame's rate.
    fn infer(
        &mut self,
        frame: &[f32],
        state: &VadState,
        sample_rate: i64,
    ) -> Result<VadOutput, InferenceError>;
}

/// A stateless pitch salience model.
pub trait PitchSalienceModel: Send {
    /// Runs one frame through the model and returns its raw salience vector.
    fn salience(&mut self, frame: &[f32]) -> Result<Vec<f32>, InferenceError>;
}

/// Stand-in for a model that could not be loaded. Every call fails with
/// [`InferenceError::ModelUnavailable`], which the extractors degrade to
/// zeros.
pub struct UnavailableModel {
    name: &'static str,
}

impl UnavailableModel {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl VoiceActivityModel for UnavailableModel {
    fn infer(&mut self, _: &[f32], _: &VadState, _: i64) -> Result<VadOutput, InferenceError> {
        Err(InferenceError::ModelUnavailable(self.name))
    }
}

impl PitchSalienceModel for UnavailableModel {
    fn salience(&mut self, _: &[f32]) -> Result<Vec<f32>, InferenceError> {
        Err(InferenceError::ModelUnavailable(self.name))
    }
}

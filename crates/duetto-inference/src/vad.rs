use crate::InferenceError;

/// Recurrent hidden state of the voice-activity model.
///
/// The buffer is opaque to the engine: it is zeroed at session start and
/// replaced only by a successful model call.
#[derive(Debug, Clone, PartialEq)]
pub struct VadState(Vec<f32>);

impl VadState {
    /// Creates a zeroed state of `len` floats.
    pub fn zeroed(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zeroes the state in place.
    pub fn reset(&mut self) {
        self.0.fill(0.0);
    }
}

impl From<Vec<f32>> for VadState {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Result of one voice-activity model call.
#[derive(Debug, Clone)]
pub struct VadOutput {
    pub probability: f32,
    pub state: VadState,
}

/// Turns raw voice-activity model results into a probability, owning the
/// session's failure bookkeeping.
#[derive(Debug, Default)]
pub struct VadExtractor {
    failed: bool,
}

impl VadExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a failure was observed during this session.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Commits a model result.
    ///
    /// On success the probability is clamped to `[0, 1]` and `state` is
    /// replaced by the model's updated state. Any failure (including a state
    /// of the wrong length or a non-finite probability) yields `0.0` and
    /// leaves `state` untouched; only the first failure of the session is
    /// logged.
    pub fn accept(
        &mut self,
        result: Result<VadOutput, InferenceError>,
        state: &mut VadState,
    ) -> f32 {
        let output = result.and_then(|output| {
            if !output.probability.is_finite() {
                return Err(InferenceError::Malformed(format!(
                    "non-finite probability {}",
                    output.probability
                )));
            }
            if output.state.len() != state.len() {
                return Err(InferenceError::Malformed(format!(
                    "state has {} values, expected {}",
                    output.state.len(),
                    state.len()
                )));
            }
            Ok(output)
        });

        match output {
            Ok(output) => {
                *state = output.state;
                output.probability.clamp(0.0, 1.0)
            }
            Err(err) => {
                if !self.failed {
                    log::warn!(
                        "Voice activity extraction failed, using 0 from now on when it does: {err}"
                    );
                    self.failed = true;
                }
                0.0
            }
        }
    }
}

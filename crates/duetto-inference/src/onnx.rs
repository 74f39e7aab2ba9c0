//! ONNX Runtime implementations of the model contracts.

use std::path::Path;

use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

use crate::{
    InferenceError, PitchSalienceModel, SALIENCE_BINS, VoiceActivityModel,
    vad::{VadOutput, VadState},
};

fn model_error(err: impl std::fmt::Display) -> InferenceError {
    InferenceError::Model(err.to_string())
}

fn build_session(model_path: &Path) -> Result<Session, InferenceError> {
    Session::builder()
        .map_err(model_error)?
        .with_intra_threads(1)
        .map_err(model_error)?
        .with_inter_threads(1)
        .map_err(model_error)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(model_error)?
        .commit_from_file(model_path)
        .map_err(model_error)
}

/// Shape of a two-layer recurrent state holding `len` values.
fn vad_state_shape(len: usize) -> Result<[usize; 3], InferenceError> {
    if len == 0 || len % 2 == 1 {
        return Err(InferenceError::Malformed(format!(
            "voice activity state of {len} values does not split into two layers"
        )));
    }
    Ok([2, 1, len / 2])
}

/// Silero-style voice-activity detector.
///
/// Inputs: `input` `[1, N]`, `state` `[2, 1, S / 2]` for a state of `S`
/// values, `sr` `[1]` (int64). Outputs: `output` (probability) and `stateN`.
pub struct OnnxVad {
    session: Session,
}

impl OnnxVad {
    pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
        let session = build_session(model_path)?;
        log::info!("Loaded voice activity model from {model_path:?}");
        Ok(Self { session })
    }
}

impl VoiceActivityModel for OnnxVad {
    fn infer(
        &mut self,
        frame: &[f32],
        state: &VadState,
        sample_rate: i64,
    ) -> Result<VadOutput, InferenceError> {
        let state_shape = vad_state_shape(state.len())?;
        let sample_rate = [sample_rate];
        let input = TensorRef::from_array_view(([1usize, frame.len()], frame))
            .map_err(model_error)?;
        let state = TensorRef::from_array_view((state_shape, state.as_slice()))
            .map_err(model_error)?;
        let rate = TensorRef::from_array_view(([1usize], &sample_rate[..]))
            .map_err(model_error)?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input" => input,
                "state" => state,
                "sr" => rate,
            ])
            .map_err(model_error)?;

        let (_, probability) = outputs["output"]
            .try_extract_tensor::<f32>()
            .map_err(model_error)?;
        let probability = probability
            .first()
            .copied()
            .ok_or_else(|| InferenceError::Malformed("empty probability tensor".into()))?;

        let (_, next_state) = outputs["stateN"]
            .try_extract_tensor::<f32>()
            .map_err(model_error)?;

        Ok(VadOutput {
            probability,
            state: VadState::from(next_state.to_vec()),
        })
    }
}

/// CREPE-style pitch model.
///
/// Input: `audio` `[1, 1024]`. Output: `probabilities` with 360 bins.
pub struct OnnxPitch {
    session: Session,
}

impl OnnxPitch {
    pub fn load(model_path: &Path) -> Result<Self, InferenceError> {
        let session = build_session(model_path)?;
        log::info!("Loaded pitch model from {model_path:?}");
        Ok(Self { session })
    }
}

impl PitchSalienceModel for OnnxPitch {
    fn salience(&mut self, frame: &[f32]) -> Result<Vec<f32>, InferenceError> {
        let audio = TensorRef::from_array_view(([1usize, frame.len()], frame))
            .map_err(model_error)?;
        let outputs = self
            .session
            .run(ort::inputs!["audio" => audio])
            .map_err(model_error)?;

        let (_, salience) = outputs["probabilities"]
            .try_extract_tensor::<f32>()
            .map_err(model_error)?;
        // a batched output holds several frames, the last one is the newest
        let start = salience.len().saturating_sub(SALIENCE_BINS);
        Ok(salience[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_shape_follows_the_configured_length() {
        assert_eq!(vad_state_shape(256).expect("even length"), [2, 1, 128]);
        assert_eq!(vad_state_shape(64).expect("even length"), [2, 1, 32]);
        assert!(matches!(vad_state_shape(0), Err(InferenceError::Malformed(_))));
        assert!(matches!(vad_state_shape(255), Err(InferenceError::Malformed(_))));
    }
}

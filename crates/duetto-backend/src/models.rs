//! Loading of the voice-activity and pitch models for the inference worker.

use duetto_bridge::config::ModelConfig;
use duetto_inference::{
    PitchSalienceModel, UnavailableModel, VoiceActivityModel, worker::ModelSet,
};

/// Builds the model set described by `config`. A model that is not
/// configured or fails to load is replaced by an [`UnavailableModel`], so the
/// session still runs with that feature reading zero.
pub(crate) fn load_models(config: &ModelConfig) -> ModelSet {
    ModelSet {
        vad: load_vad(config),
        pitch: load_pitch(config),
        sample_rate: config.model_sample_rate,
    }
}

#[cfg(feature = "onnx")]
fn load_vad(config: &ModelConfig) -> Box<dyn VoiceActivityModel> {
    use duetto_inference::onnx::OnnxVad;

    match config.vad_model_path.as_deref() {
        Some(path) => match OnnxVad::load(path) {
            Ok(model) => {
                log::info!("Loaded voice-activity model from {path:?}");
                Box::new(model)
            }
            Err(err) => {
                log::error!("Failed to load voice-activity model from {path:?}: {err}");
                Box::new(UnavailableModel::new("vad"))
            }
        },
        None => {
            log::warn!("No voice-activity model configured");
            Box::new(UnavailableModel::new("vad"))
        }
    }
}

#[cfg(feature = "onnx")]
fn load_pitch(config: &ModelConfig) -> Box<dyn PitchSalienceModel> {
    use duetto_inference::onnx::OnnxPitch;

    match config.pitch_model_path.as_deref() {
        Some(path) => match OnnxPitch::load(path) {
            Ok(model) => {
                log::info!("Loaded pitch model from {path:?}");
                Box::new(model)
            }
            Err(err) => {
                log::error!("Failed to load pitch model from {path:?}: {err}");
                Box::new(UnavailableModel::new("pitch"))
            }
        },
        None => {
            log::warn!("No pitch model configured");
            Box::new(UnavailableModel::new("pitch"))
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn load_vad(_config: &ModelConfig) -> Box<dyn VoiceActivityModel> {
    log::warn!("Built without the `onnx` feature, voice activity will read zero");
    Box::new(UnavailableModel::new("vad"))
}

#[cfg(not(feature = "onnx"))]
fn load_pitch(_config: &ModelConfig) -> Box<dyn PitchSalienceModel> {
    log::warn!("Built without the `onnx` feature, pitch will read zero");
    Box::new(UnavailableModel::new("pitch"))
}

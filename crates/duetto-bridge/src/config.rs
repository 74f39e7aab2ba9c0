use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::media::CalibrationResult;

/// Manual override of the confidence gate.
///
/// In [`ManualMode::Auto`] the gate follows the performer's confidence. The
/// other two modes pin the gate target regardless of what the performer does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualMode {
    /// Gate follows the blended confidence score. Default value.
    #[default]
    Auto,
    /// Guide vocal is always fully present (0 dB target).
    AlwaysOn,
    /// Guide vocal is always ducked (duck target).
    AlwaysOff,
}

/// Block delivery and session-wide engine settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Native sample rate of the live microphone blocks, in Hz.
    pub sample_rate: u32,
    /// Number of mono samples in a single real-time block.
    pub block_size: usize,
    /// Maximum number of blocks waiting for processing before the oldest
    /// ones get dropped.
    pub queue_capacity: usize,
    /// Upper bound for a single inference round-trip, in milliseconds.
    pub inference_timeout_ms: u64,
    /// Number of telemetry entries kept in memory.
    pub telemetry_capacity: usize,
    /// How many processed blocks pass between two meter updates.
    pub meter_interval_blocks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 128,
            queue_capacity: 32,
            inference_timeout_ms: 50,
            telemetry_capacity: 2048,
            meter_interval_blocks: 16,
        }
    }
}

/// Locations and input geometry of the voice-activity and pitch models.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the voice-activity ONNX model, if any.
    pub vad_model_path: Option<PathBuf>,
    /// Path to the pitch salience ONNX model, if any.
    pub pitch_model_path: Option<PathBuf>,
    /// Sample rate both models expect their frames at, in Hz.
    pub model_sample_rate: u32,
    /// Length of one VAD frame at the model rate.
    pub vad_frame_samples: usize,
    /// Length of one pitch frame at the model rate.
    pub pitch_frame_samples: usize,
    /// Number of floats in the recurrent VAD state tensor.
    pub vad_state_len: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vad_model_path: Some(PathBuf::from("models/vad.onnx")),
            pitch_model_path: Some(PathBuf::from("models/crepe_tiny.onnx")),
            model_sample_rate: 16_000,
            vad_frame_samples: 160,
            pitch_frame_samples: 1024,
            vad_state_len: 2 * 128,
        }
    }
}

/// Weights and energy-gate bounds used to blend VAD and pitch confidence.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub vad_weight: f32,
    pub pitch_weight: f32,
    /// Reserved for phrase-aware scoring; not used by the scorer.
    pub phrase_aware_weight: f32,
    /// Block RMS at and below which the energy gate is fully closed.
    pub silence_floor_rms: f32,
    /// Block RMS at and above which the energy gate is fully open.
    pub full_scale_rms: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            vad_weight: 0.6,
            pitch_weight: 0.4,
            phrase_aware_weight: 0.0,
            silence_floor_rms: 0.001,
            full_scale_rms: 0.05,
        }
    }
}

/// Confidence gate timing and hysteresis.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Reserved look-ahead; the gate itself does not delay the signal.
    pub look_ahead_ms: f32,
    /// Time constant used while the gain moves toward the duck level.
    pub attack_ms: f32,
    /// Time constant used while the gain moves toward 0 dB.
    pub release_ms: f32,
    pub hold_ms: f32,
    pub threshold_on: f32,
    pub threshold_off: f32,
    pub frames_on: u32,
    pub frames_off: u32,
    /// Attenuation of the ducked guide, in dB (negative).
    pub duck_db: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            look_ahead_ms: 10.0,
            attack_ms: 20.0,
            release_ms: 180.0,
            hold_ms: 150.0,
            threshold_on: 0.7,
            threshold_off: 0.4,
            frames_on: 3,
            frames_off: 6,
            duck_db: -18.0,
        }
    }
}

/// Playback-related settings of the reference tracks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Whether playback wraps around at the end of the longer track.
    pub loop_playback: bool,
    pub instrument_gain_db: f32,
    pub guide_gain_db: f32,
    /// Coefficient the leak canceller relaxes toward while nothing plays.
    pub leak_baseline: f32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            loop_playback: true,
            instrument_gain_db: 0.0,
            guide_gain_db: 0.0,
            leak_baseline: 0.13,
        }
    }
}

/// User-facing tuning knobs. Each one maps deterministically into engine
/// coefficients when the configuration is applied.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TuningConfig {
    pub manual_mode: ManualMode,
    /// Noise gate threshold amplitude, in `[0, 0.6]`.
    pub noise_floor: f32,
    /// Direct mic monitor gain, in `[-60, 6]` dB.
    pub mic_monitor_gain_db: f32,
    /// Strength of the instrument leak cancellation, in `[0, 1]`.
    pub crowd_cancel_strength: f32,
    /// Amount and length of the reverb tail, in `[0, 1]`.
    pub reverb_strength: f32,
    /// Amount of timbre tilt applied to the guide, in `[0, 1]`.
    pub timbre_strength: f32,
    /// How lazily the guide envelope releases, in `[0, 1]`.
    pub phrase_smoothness: f32,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            manual_mode: ManualMode::Auto,
            noise_floor: 0.02,
            mic_monitor_gain_db: -6.0,
            crowd_cancel_strength: 0.5,
            reverb_strength: 0.35,
            timbre_strength: 0.5,
            phrase_smoothness: 0.5,
        }
    }
}

/// Configuration for selecting specific audio devices and backends.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioDeviceConfig {
    /// Identifier of the preferred audio host/backend.
    pub selected_host_id: Option<String>,
    /// Identifier of the preferred audio input device.
    pub selected_device_id: Option<String>,
}

/// Global application configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub models: ModelConfig,
    pub confidence: ConfidenceConfig,
    pub gate: GateConfig,
    pub media: MediaConfig,
    pub tuning: TuningConfig,
    /// Configuration for audio devices for the host.
    pub audio_device_config: AudioDeviceConfig,
    /// Result of the most recent calibration run, kept for session resume.
    pub calibration: Option<CalibrationResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.engine.block_size, 128);
        assert_eq!(config.gate.frames_on, 3);
        assert_eq!(config.tuning.manual_mode, ManualMode::Auto);
        assert!(config.calibration.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [gate]
            duck_db = -24.0

            [tuning]
            manual_mode = "always_on"
            "#,
        )
        .expect("partial config should parse");

        assert_eq!(config.gate.duck_db, -24.0);
        assert_eq!(config.gate.hold_ms, 150.0);
        assert_eq!(config.tuning.manual_mode, ManualMode::AlwaysOn);
        assert_eq!(config.tuning.noise_floor, 0.02);
    }

    #[test]
    fn config_survives_pretty_serialization() {
        let mut config = Config::default();
        config.calibration = Some(CalibrationResult {
            noise_floor_db: -80.0,
            vocal_peak_db: -9.5,
            is_valid: true,
        });

        let text = toml::to_string_pretty(&config).expect("config should serialize");
        let parsed: Config = toml::from_str(&text).expect("serialized config should parse");
        assert_eq!(parsed.calibration, config.calibration);
        assert_eq!(parsed.engine.sample_rate, 48_000);
    }
}

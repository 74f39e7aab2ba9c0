//! Mapping of user-facing tuning knobs into engine coefficients.

use duetto_bridge::config::{Config, TuningConfig};

use crate::{db_to_linear, dynamics::DynamicsParameters, leak::LeakParameters};

const MAX_NOISE_FLOOR: f32 = 0.6;
const MIN_MONITOR_DB: f32 = -60.0;
const MAX_MONITOR_DB: f32 = 6.0;

/// All coefficients derived from one configuration value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedCoefficients {
    pub monitor_gain: f32,
    pub instrument_gain: f32,
    pub guide_gain: f32,
    pub leak: LeakParameters,
    pub dynamics: DynamicsParameters,
}

impl DerivedCoefficients {
    pub fn from_config(config: &Config) -> Self {
        let tuning = &config.tuning;
        Self {
            monitor_gain: db_to_linear(clamp_unit(
                tuning.mic_monitor_gain_db,
                MIN_MONITOR_DB,
                MAX_MONITOR_DB,
            )),
            instrument_gain: db_to_linear(config.media.instrument_gain_db),
            guide_gain: db_to_linear(config.media.guide_gain_db),
            leak: leak_parameters(tuning, config.media.leak_baseline),
            dynamics: dynamics_parameters(tuning),
        }
    }
}

/// Clamps `value` into `[min, max]`, mapping NaN to `min`.
fn clamp_unit(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() { min } else { value.clamp(min, max) }
}

fn leak_parameters(tuning: &TuningConfig, baseline: f32) -> LeakParameters {
    let strength = clamp_unit(tuning.crowd_cancel_strength, 0.0, 1.0);
    let clamp_max = 0.25 + 1.25 * strength;
    LeakParameters {
        adapt_rate: 0.02 * strength,
        recovery_rate: 0.0005 + 0.002 * strength,
        clamp_max,
        baseline: clamp_unit(baseline, 0.0, clamp_max),
    }
}

fn dynamics_parameters(tuning: &TuningConfig) -> DynamicsParameters {
    let reverb = clamp_unit(tuning.reverb_strength, 0.0, 1.0);
    let phrase = clamp_unit(tuning.phrase_smoothness, 0.0, 1.0);
    DynamicsParameters {
        noise_floor: clamp_unit(tuning.noise_floor, 0.0, MAX_NOISE_FLOOR),
        envelope_hold_ms: 40.0 + 260.0 * phrase,
        envelope_release_ms: 80.0 + 720.0 * phrase,
        release_modulation: 1.0 + 3.0 * (1.0 - phrase),
        tail_mix: 0.6 * reverb,
        tail_seconds: 0.4 + 2.6 * reverb,
        tilt_scale: clamp_unit(tuning.timbre_strength, 0.0, 1.0),
    }
}

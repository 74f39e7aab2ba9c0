//! The real-time vocal-assist engine.
//!
//! One [`AudioEngine`] exists per session and exclusively owns every piece of
//! per-session state: the leak canceller, the confidence gate, the dynamics
//! followers, the playback cursor, the guide pitch track, and the telemetry
//! ring. Blocks are processed strictly one after another; the only suspension
//! points are the inference round-trips awaited inside
//! [`AudioEngine::process_block`].

pub mod calibration;
pub mod confidence;
pub mod dynamics;
pub mod engine;
pub mod gate;
pub mod guide;
pub mod leak;
pub mod playback;
pub mod queue;
pub mod telemetry;
pub mod track;
pub mod tuning;

pub use crate::engine::{AudioEngine, BlockReport};

/// Converts a level in decibels into a linear amplitude factor.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Converts a linear amplitude factor into decibels, flooring silence at
/// -120 dB.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-6).log10()
}

/// Coefficient of a one-pole smoother with time constant `time_ms`, evaluated
/// over `elapsed_ms`. Time constants below 1 ms are treated as 1 ms.
#[inline]
pub fn one_pole_coefficient(elapsed_ms: f32, time_ms: f32) -> f32 {
    (-elapsed_ms / time_ms.max(1.0)).exp()
}

/// Moves `current` toward `target` with the given one-pole coefficient.
#[inline]
pub(crate) fn smooth_toward(current: f32, target: f32, coefficient: f32) -> f32 {
    target + (current - target) * coefficient
}

/// Duration of `samples` samples at `sample_rate`, in milliseconds.
#[inline]
pub fn block_duration_ms(samples: usize, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f32 * 1000.0 / sample_rate as f32
}

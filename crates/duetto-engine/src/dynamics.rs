//! Guide envelope, reverb tail, and timbre tilt followers.
//!
//! Everything here runs once per block on the leak-cancelled signal. All
//! followers are one-pole smoothers whose coefficients are computed from the
//! block duration and a time constant.

use crate::{linear_to_db, one_pole_coefficient, smooth_toward};

const NOISE_GATE_RISE_MS: f32 = 5.0;
const NOISE_GATE_FALL_MS: f32 = 80.0;
const NOISE_GATE_HOLD_MS: f32 = 60.0;
const ENVELOPE_ATTACK_MS: f32 = 15.0;
const TAIL_ATTACK_MS: f32 = 60.0;
const TIMBRE_LOW_MS: f32 = 120.0;
const TIMBRE_FAST_MS: f32 = 8.0;
const TILT_SMOOTHING_MS: f32 = 200.0;
const VOCAL_STRENGTH_MS: f32 = 50.0;
/// Lowest linear factor a shelf may reach, i.e. -60 dB.
const MIN_SHELF_FACTOR: f32 = 1e-3;

/// Tuning-derived settings of the followers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsParameters {
    /// Block peak magnitude that opens the noise gate.
    pub noise_floor: f32,
    pub envelope_hold_ms: f32,
    pub envelope_release_ms: f32,
    /// How strongly confidence shortens the envelope release.
    pub release_modulation: f32,
    /// Maximum reverb tail send level.
    pub tail_mix: f32,
    /// Release time of the tail follower.
    pub tail_seconds: f32,
    pub tilt_scale: f32,
}

impl Default for DynamicsParameters {
    fn default() -> Self {
        Self {
            noise_floor: 0.02,
            envelope_hold_ms: 170.0,
            envelope_release_ms: 440.0,
            release_modulation: 2.5,
            tail_mix: 0.21,
            tail_seconds: 1.31,
            tilt_scale: 0.5,
        }
    }
}

/// Per-block input of the followers.
#[derive(Debug, Clone, Copy)]
pub struct DynamicsInput<'a> {
    /// Leak-cancelled microphone block.
    pub block: &'a [f32],
    /// Confidence-gate gain normalized to `[0, 1]`.
    pub gate: f32,
    pub confidence: f32,
    pub playing: bool,
    pub guide_muted: bool,
}

/// Per-block output of the followers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DynamicsOutput {
    /// Guide-audible envelope in `[0, 1]`.
    pub guide_envelope: f32,
    /// Reverb tail send in `[0, tail_mix]`.
    pub tail_send: f32,
    /// Timbre tilt in `[-1, 1]`.
    pub tilt: f32,
    pub low_shelf_db: f32,
    pub high_shelf_db: f32,
    pub vocal_strength: f32,
    pub noise_gate: f32,
}

/// Shelf gains in dB for a tilt value: the low shelf follows `1 - tilt`, the
/// high shelf `1 + tilt`.
pub fn shelf_gains_db(tilt: f32) -> (f32, f32) {
    (
        linear_to_db((1.0 - tilt).max(MIN_SHELF_FACTOR)),
        linear_to_db((1.0 + tilt).max(MIN_SHELF_FACTOR)),
    )
}

#[derive(Debug, Clone, Copy)]
struct Coefficients {
    noise_rise: f32,
    noise_fall: f32,
    envelope_attack: f32,
    tail_attack: f32,
    tail_release: f32,
    timbre_low: f32,
    timbre_fast: f32,
    tilt: f32,
    vocal_strength: f32,
}

impl Coefficients {
    fn new(block_ms: f32, parameters: &DynamicsParameters) -> Self {
        Self {
            noise_rise: one_pole_coefficient(block_ms, NOISE_GATE_RISE_MS),
            noise_fall: one_pole_coefficient(block_ms, NOISE_GATE_FALL_MS),
            envelope_attack: one_pole_coefficient(block_ms, ENVELOPE_ATTACK_MS),
            tail_attack: one_pole_coefficient(block_ms, TAIL_ATTACK_MS),
            tail_release: one_pole_coefficient(block_ms, parameters.tail_seconds * 1000.0),
            timbre_low: one_pole_coefficient(block_ms, TIMBRE_LOW_MS),
            timbre_fast: one_pole_coefficient(block_ms, TIMBRE_FAST_MS),
            tilt: one_pole_coefficient(block_ms, TILT_SMOOTHING_MS),
            vocal_strength: one_pole_coefficient(block_ms, VOCAL_STRENGTH_MS),
        }
    }
}

/// Follower memory. Every field stays within its documented range.
#[derive(Debug, Clone)]
pub struct DynamicsShaper {
    parameters: DynamicsParameters,
    block_ms: f32,
    coefficients: Coefficients,

    noise_gate: f32,
    noise_hold_ms: f32,
    envelope: f32,
    envelope_hold_ms: f32,
    tail: f32,
    low_follower: f32,
    fast_follower: f32,
    tilt: f32,
    vocal_strength: f32,
}

impl DynamicsShaper {
    pub fn new(parameters: DynamicsParameters, block_ms: f32) -> Self {
        Self {
            coefficients: Coefficients::new(block_ms, &parameters),
            parameters,
            block_ms,
            noise_gate: 0.0,
            noise_hold_ms: 0.0,
            envelope: 0.0,
            envelope_hold_ms: 0.0,
            tail: 0.0,
            low_follower: 0.0,
            fast_follower: 0.0,
            tilt: 0.0,
            vocal_strength: 0.0,
        }
    }

    /// Replaces the tuning while keeping follower memory.
    pub fn configure(&mut self, parameters: DynamicsParameters, block_ms: f32) {
        self.parameters = parameters;
        self.block_ms = block_ms;
        self.coefficients = Coefficients::new(block_ms, &parameters);
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.parameters, self.block_ms);
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn vocal_strength(&self) -> f32 {
        self.vocal_strength
    }

    pub fn process(&mut self, input: DynamicsInput<'_>) -> DynamicsOutput {
        let (peak, mean_magnitude) = block_magnitudes(input.block);

        self.update_noise_gate(peak);
        self.update_envelope(&input);
        self.update_tail();
        self.update_tilt(mean_magnitude);

        let strength_target = (input.confidence * self.noise_gate).clamp(0.0, 1.0);
        self.vocal_strength = smooth_toward(
            self.vocal_strength,
            strength_target,
            self.coefficients.vocal_strength,
        );

        let tail_mix = self.parameters.tail_mix.clamp(0.0, 1.0);
        let (low_shelf_db, high_shelf_db) = shelf_gains_db(self.tilt);

        DynamicsOutput {
            guide_envelope: self.envelope,
            tail_send: (self.tail * self.tail * tail_mix).min(tail_mix),
            tilt: self.tilt,
            low_shelf_db,
            high_shelf_db,
            vocal_strength: self.vocal_strength,
            noise_gate: self.noise_gate,
        }
    }

    fn update_noise_gate(&mut self, peak: f32) {
        let open = if peak > self.parameters.noise_floor {
            self.noise_hold_ms = NOISE_GATE_HOLD_MS;
            true
        } else if self.noise_hold_ms > 0.0 {
            self.noise_hold_ms = (self.noise_hold_ms - self.block_ms).max(0.0);
            true
        } else {
            false
        };

        let target = if open { 1.0 } else { 0.0 };
        let coefficient = if target > self.noise_gate {
            self.coefficients.noise_rise
        } else {
            self.coefficients.noise_fall
        };
        self.noise_gate = smooth_toward(self.noise_gate, target, coefficient).clamp(0.0, 1.0);
    }

    fn update_envelope(&mut self, input: &DynamicsInput<'_>) {
        let mut target = input.gate.clamp(0.0, 1.0) * self.noise_gate;
        if !input.playing || input.guide_muted {
            target = 0.0;
        }

        if target >= self.envelope {
            self.envelope = smooth_toward(self.envelope, target, self.coefficients.envelope_attack);
            self.envelope_hold_ms = self.parameters.envelope_hold_ms;
        } else if self.envelope_hold_ms > 0.0 {
            self.envelope_hold_ms = (self.envelope_hold_ms - self.block_ms).max(0.0);
        } else {
            let modulation = 1.0
                + self.parameters.release_modulation.max(0.0) * input.confidence.clamp(0.0, 1.0);
            let release_ms = self.parameters.envelope_release_ms / modulation;
            let coefficient = one_pole_coefficient(self.block_ms, release_ms);
            self.envelope = smooth_toward(self.envelope, target, coefficient);
        }
        self.envelope = self.envelope.clamp(0.0, 1.0);
    }

    fn update_tail(&mut self) {
        let coefficient = if self.envelope > self.tail {
            self.coefficients.tail_attack
        } else {
            self.coefficients.tail_release
        };
        self.tail = smooth_toward(self.tail, self.envelope, coefficient).clamp(0.0, 1.0);
    }

    fn update_tilt(&mut self, magnitude: f32) {
        self.low_follower =
            smooth_toward(self.low_follower, magnitude, self.coefficients.timbre_low);
        self.fast_follower =
            smooth_toward(self.fast_follower, magnitude, self.coefficients.timbre_fast);

        let high_band = self.fast_follower - self.low_follower;
        let brightness = if self.low_follower > 1e-6 {
            high_band / self.low_follower
        } else {
            0.0
        };
        let target = (brightness * self.parameters.tilt_scale).clamp(-1.0, 1.0);
        self.tilt = smooth_toward(self.tilt, target, self.coefficients.tilt).clamp(-1.0, 1.0);
    }
}

/// Peak absolute sample and mean absolute sample of a block.
fn block_magnitudes(block: &[f32]) -> (f32, f32) {
    if block.is_empty() {
        return (0.0, 0.0);
    }
    let (peak, sum) = block.iter().fold((0.0f32, 0.0f32), |(peak, sum), sample| {
        let magnitude = sample.abs();
        (peak.max(magnitude), sum + magnitude)
    });
    (peak, sum / block.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_duration_ms;

    fn shaper() -> DynamicsShaper {
        DynamicsShaper::new(DynamicsParameters::default(), block_duration_ms(128, 48_000))
    }

    fn input(block: &[f32], gate: f32, confidence: f32) -> DynamicsInput<'_> {
        DynamicsInput {
            block,
            gate,
            confidence,
            playing: true,
            guide_muted: false,
        }
    }

    #[test]
    fn silence_keeps_the_envelope_closed() {
        let mut shaper = shaper();
        let block = [0.0f32; 128];
        for _ in 0..50 {
            let output = shaper.process(input(&block, 1.0, 0.0));
            assert_eq!(output.guide_envelope, 0.0);
            assert_eq!(output.noise_gate, 0.0);
            assert_eq!(output.tail_send, 0.0);
        }
    }

    #[test]
    fn envelope_rises_with_an_open_gate() {
        let mut shaper = shaper();
        let block = [0.2f32; 128];
        let mut output = DynamicsOutput::default();
        for _ in 0..400 {
            output = shaper.process(input(&block, 1.0, 0.5));
        }
        assert!(output.guide_envelope > 0.99);
        assert!(output.tail_send > 0.0 && output.tail_send <= 0.21);
    }

    #[test]
    fn stopped_playback_or_mute_silences_the_guide() {
        let block = [0.2f32; 128];
        for (playing, guide_muted) in [(false, false), (true, true)] {
            let mut shaper = shaper();
            for _ in 0..200 {
                let output = shaper.process(DynamicsInput {
                    block: &block,
                    gate: 1.0,
                    confidence: 0.5,
                    playing,
                    guide_muted,
                });
                assert_eq!(output.guide_envelope, 0.0);
            }
        }
    }

    #[test]
    fn release_waits_for_hold_and_confidence_speeds_it_up() {
        let block_ms = block_duration_ms(128, 48_000);
        let loud = [0.2f32; 128];

        let release_after = |confidence: f32| {
            let mut shaper = shaper();
            for _ in 0..400 {
                shaper.process(input(&loud, 1.0, confidence));
            }
            let opened = shaper.envelope();
            let hold_blocks = (170.0 / block_ms).floor() as usize;
            for _ in 0..hold_blocks {
                shaper.process(input(&loud, 0.0, confidence));
                assert_eq!(shaper.envelope(), opened);
            }
            for _ in 0..60 {
                shaper.process(input(&loud, 0.0, confidence));
            }
            shaper.envelope()
        };

        assert!(release_after(1.0) < release_after(0.0));
    }

    #[test]
    fn tilt_stays_bounded() {
        let mut shaper = shaper();
        let mut output = DynamicsOutput::default();
        for step in 0..2000 {
            let level = if step % 7 == 0 { 0.9 } else { 0.001 };
            output = shaper.process(input(&[level; 128], 1.0, 1.0));
            assert!((-1.0..=1.0).contains(&output.tilt));
        }
        assert!(output.low_shelf_db.is_finite() && output.high_shelf_db.is_finite());
    }

    #[test]
    fn full_tilt_floors_the_shelf() {
        let (low, high) = shelf_gains_db(1.0);
        assert!((low + 60.0).abs() < 1e-3);
        assert!((high - 6.0206).abs() < 1e-3);
        assert_eq!(shelf_gains_db(0.0), (0.0, 0.0));
    }
}

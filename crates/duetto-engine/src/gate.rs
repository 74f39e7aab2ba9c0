//! Confidence gate: a hysteresis and hold state machine that turns the
//! per-block confidence into a smoothed gain between the duck level and 0 dB.

use duetto_bridge::config::{GateConfig, ManualMode};

use crate::{db_to_linear, one_pole_coefficient, smooth_toward};

const ZERO_DB: f32 = 0.0;

/// Gate memory. The gain always stays within `[duck_db, 0]`.
#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    config: GateConfig,
    elapsed_ms: f32,
    attack_coefficient: f32,
    release_coefficient: f32,
    gain_db: f32,
    target_db: f32,
    hold_timer_ms: f32,
    consecutive_on: u32,
    consecutive_off: u32,
    manual_mode: ManualMode,
}

impl ConfidenceGate {
    /// Creates a gate evaluated once per block of `block_ms` milliseconds.
    /// The gate starts fully ducked.
    pub fn new(config: GateConfig, block_ms: f32) -> Self {
        let mut gate = Self {
            attack_coefficient: 0.0,
            release_coefficient: 0.0,
            elapsed_ms: block_ms,
            gain_db: config.duck_db,
            target_db: config.duck_db,
            hold_timer_ms: 0.0,
            consecutive_on: 0,
            consecutive_off: 0,
            manual_mode: ManualMode::Auto,
            config,
        };
        gate.update_coefficients();
        gate
    }

    /// Replaces timing and thresholds and resets the gate memory. The manual
    /// mode survives.
    pub fn configure(&mut self, config: GateConfig, block_ms: f32) {
        self.config = config;
        self.elapsed_ms = block_ms;
        self.update_coefficients();
        self.reset();
    }

    fn update_coefficients(&mut self) {
        self.attack_coefficient = one_pole_coefficient(self.elapsed_ms, self.config.attack_ms);
        self.release_coefficient = one_pole_coefficient(self.elapsed_ms, self.config.release_ms);
    }

    pub fn set_manual_mode(&mut self, mode: ManualMode) {
        self.manual_mode = mode;
    }

    pub fn manual_mode(&self) -> ManualMode {
        self.manual_mode
    }

    /// Returns the gate to the ducked state and clears counters and hold.
    pub fn reset(&mut self) {
        self.gain_db = self.config.duck_db;
        self.target_db = self.config.duck_db;
        self.hold_timer_ms = 0.0;
        self.consecutive_on = 0;
        self.consecutive_off = 0;
    }

    /// Advances the gate by one block and returns the new gain in dB.
    pub fn update(&mut self, confidence: f32) -> f32 {
        match self.manual_mode {
            ManualMode::AlwaysOn => self.target_db = ZERO_DB,
            ManualMode::AlwaysOff => self.target_db = self.config.duck_db,
            ManualMode::Auto => self.update_target(confidence),
        }

        if self.hold_timer_ms > 0.0 {
            self.hold_timer_ms = (self.hold_timer_ms - self.elapsed_ms).max(0.0);
        }

        // attack moves toward the duck level, release toward 0 dB
        let coefficient = if self.gain_db > self.target_db {
            self.attack_coefficient
        } else {
            self.release_coefficient
        };
        self.gain_db = smooth_toward(self.gain_db, self.target_db, coefficient);
        self.gain_db = self.gain_db.clamp(self.config.duck_db.min(ZERO_DB), ZERO_DB);
        self.gain_db
    }

    fn update_target(&mut self, confidence: f32) {
        if confidence >= self.config.threshold_on {
            self.consecutive_on += 1;
            self.consecutive_off = 0;
        } else if confidence <= self.config.threshold_off {
            self.consecutive_off += 1;
            self.consecutive_on = 0;
        } else {
            // an ambiguous block must not interrupt a pending release
            self.consecutive_on = 0;
        }

        if self.consecutive_on >= self.config.frames_on {
            self.target_db = ZERO_DB;
            self.hold_timer_ms = self.config.hold_ms;
        } else if self.consecutive_off >= self.config.frames_off && self.hold_timer_ms <= 0.0 {
            self.target_db = self.config.duck_db;
        }
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn gain_linear(&self) -> f32 {
        db_to_linear(self.gain_db)
    }

    pub fn target_db(&self) -> f32 {
        self.target_db
    }

    pub fn hold_timer_ms(&self) -> f32 {
        self.hold_timer_ms
    }

    pub fn duck_db(&self) -> f32 {
        self.config.duck_db
    }

    /// Gain normalized against the duck range: `0` when fully ducked, `1` at
    /// 0 dB.
    pub fn normalized_gain(&self) -> f32 {
        let duck_db = self.config.duck_db.min(ZERO_DB);
        if duck_db >= ZERO_DB {
            return 1.0;
        }
        ((self.gain_db - duck_db) / -duck_db).clamp(0.0, 1.0)
    }
}

use duetto_bridge::media::CalibrationResult;

use crate::linear_to_db;

/// Noise floor reported by every calibration run.
const NOISE_FLOOR_DB: f32 = -80.0;
/// Default length of a calibration run.
pub const DEFAULT_CALIBRATION_SECONDS: f32 = 10.0;

/// Measures the peak level of the raw microphone signal over a fixed
/// duration.
#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    target_samples: u64,
    processed: u64,
    peak: f32,
    active: bool,
}

impl Calibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) a run lasting `duration_seconds` of audio at
    /// `sample_rate`.
    pub fn start(&mut self, sample_rate: u32, duration_seconds: f32) {
        let duration_seconds = if duration_seconds.is_finite() && duration_seconds > 0.0 {
            duration_seconds
        } else {
            DEFAULT_CALIBRATION_SECONDS
        };
        self.target_samples = (f64::from(sample_rate) * f64::from(duration_seconds)).ceil() as u64;
        self.processed = 0;
        self.peak = 0.0;
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feeds one block. Returns the result when this block completed the run.
    pub fn process(&mut self, block: &[f32]) -> Option<CalibrationResult> {
        if !self.active {
            return None;
        }

        self.peak = block.iter().fold(self.peak, |peak, sample| peak.max(sample.abs()));
        self.processed += block.len() as u64;

        if self.processed < self.target_samples {
            return None;
        }
        self.active = false;
        Some(self.result())
    }

    pub fn result(&self) -> CalibrationResult {
        CalibrationResult {
            noise_floor_db: NOISE_FLOOR_DB,
            vocal_peak_db: linear_to_db(self.peak),
            is_valid: self.peak > 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_peak_after_duration() {
        let mut calibrator = Calibrator::new();
        calibrator.start(1000, 0.5);

        let mut block = [0.1f32; 100];
        block[10] = -0.5;
        for _ in 0..4 {
            assert!(calibrator.process(&block).is_none());
        }

        let result = calibrator.process(&[0.0; 100]).expect("fifth block completes the run");
        assert_eq!(result.noise_floor_db, -80.0);
        assert!((result.vocal_peak_db - (-6.0206)).abs() < 1e-3);
        assert!(result.is_valid);
        assert!(!calibrator.is_active());
        assert!(calibrator.process(&block).is_none());
    }

    #[test]
    fn silent_run_is_invalid() {
        let mut calibrator = Calibrator::new();
        calibrator.start(100, 1.0);
        let result = calibrator.process(&[0.0; 100]).expect("run completes");
        assert!(!result.is_valid);
        assert!((result.vocal_peak_db + 120.0).abs() < 1e-3);
    }

    #[test]
    fn invalid_duration_uses_default() {
        let mut calibrator = Calibrator::new();
        calibrator.start(10, -3.0);
        for _ in 0..9 {
            assert!(calibrator.process(&[0.1; 10]).is_none());
        }
        assert!(calibrator.process(&[0.1; 10]).is_some());
    }
}

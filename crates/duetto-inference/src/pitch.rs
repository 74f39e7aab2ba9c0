use crate::{InferenceError, SALIENCE_BINS};

/// Cents value of the first salience bin.
pub const CENTS_OFFSET: f32 = 1997.379_4;
/// Cents covered from the first to the last salience bin.
pub const CENTS_SPAN: f32 = 7180.0;
/// Number of bins on each side of the peak that take part in the centroid.
const CENTROID_RADIUS: usize = 4;

/// One pitch observation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz; `0.0` when unvoiced or unknown.
    pub frequency_hz: f32,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Cents value of salience bin `bin`.
#[inline]
pub fn bin_to_cents(bin: usize) -> f32 {
    CENTS_OFFSET + bin as f32 * (CENTS_SPAN / (SALIENCE_BINS - 1) as f32)
}

/// Converts cents (relative to 10 Hz) into a frequency in Hz.
#[inline]
pub fn cents_to_hz(cents: f32) -> f32 {
    10.0 * 2f32.powf(cents / 1200.0)
}

/// Decodes a salience vector into a pitch estimate.
///
/// The peak bin is located first, then a salience-weighted centroid of the
/// cents values within ±4 bins around it gives the frequency. The confidence
/// is the peak salience. Empty or degenerate vectors decode to the zero
/// estimate.
pub fn decode_salience(salience: &[f32]) -> PitchEstimate {
    let Some((peak_bin, &peak)) = salience
        .iter()
        .enumerate()
        .filter(|(_, value)| value.is_finite())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
    else {
        return PitchEstimate::default();
    };

    let start = peak_bin.saturating_sub(CENTROID_RADIUS);
    let end = (peak_bin + CENTROID_RADIUS + 1).min(salience.len());

    let mut weighted_cents = 0.0f32;
    let mut total_weight = 0.0f32;
    for (bin, &weight) in salience.iter().enumerate().take(end).skip(start) {
        if !weight.is_finite() || weight <= 0.0 {
            continue;
        }
        weighted_cents += weight * bin_to_cents(bin);
        total_weight += weight;
    }

    if total_weight <= 0.0 {
        return PitchEstimate::default();
    }

    PitchEstimate {
        frequency_hz: cents_to_hz(weighted_cents / total_weight),
        confidence: peak.clamp(0.0, 1.0),
    }
}

/// Turns raw pitch model results into estimates, owning the session's
/// failure bookkeeping.
#[derive(Debug, Default)]
pub struct PitchExtractor {
    failed: bool,
}

impl PitchExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Decodes a model result, degrading every failure (including a salience
    /// vector of the wrong length) to the zero estimate. Only the first
    /// failure of the session is logged.
    pub fn accept(&mut self, result: Result<Vec<f32>, InferenceError>) -> PitchEstimate {
        let salience = result.and_then(|salience| {
            if salience.len() != SALIENCE_BINS {
                return Err(InferenceError::Malformed(format!(
                    "salience has {} bins, expected {SALIENCE_BINS}",
                    salience.len()
                )));
            }
            Ok(salience)
        });

        match salience {
            Ok(salience) => decode_salience(&salience),
            Err(err) => {
                if !self.failed {
                    log::warn!("Pitch extraction failed, using 0 from now on when it does: {err}");
                    self.failed = true;
                }
                PitchEstimate::default()
            }
        }
    }
}

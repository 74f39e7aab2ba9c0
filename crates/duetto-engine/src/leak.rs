//! Adaptive cancellation of backing-track bleed in the microphone signal.

/// Reference magnitude below which the backing track counts as silent.
const REFERENCE_EPSILON: f32 = 1e-4;

/// Adaptation rates of the canceller, derived from the crowd-cancel
/// strength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakParameters {
    pub adapt_rate: f32,
    pub recovery_rate: f32,
    pub clamp_max: f32,
    /// Coefficient the canceller relaxes toward while no reference plays.
    pub baseline: f32,
}

impl Default for LeakParameters {
    fn default() -> Self {
        Self {
            adapt_rate: 0.01,
            recovery_rate: 0.0015,
            clamp_max: 0.875,
            baseline: 0.13,
        }
    }
}

/// LMS-style single-tap canceller.
///
/// The coefficient always stays within `[0, clamp_max]`.
#[derive(Debug, Clone)]
pub struct LeakCanceller {
    parameters: LeakParameters,
    coefficient: f32,
}

impl LeakCanceller {
    pub fn new(parameters: LeakParameters) -> Self {
        Self {
            coefficient: parameters.baseline.clamp(0.0, parameters.clamp_max),
            parameters,
        }
    }

    /// Replaces the rates, keeping the adapted coefficient within the new
    /// clamp.
    pub fn configure(&mut self, parameters: LeakParameters) {
        self.parameters = parameters;
        self.coefficient = self.coefficient.clamp(0.0, parameters.clamp_max.max(0.0));
    }

    pub fn reset(&mut self) {
        self.coefficient = self.parameters.baseline.clamp(0.0, self.parameters.clamp_max.max(0.0));
    }

    pub fn coefficient(&self) -> f32 {
        self.coefficient
    }

    /// Cancels one sample and returns the detection signal in `[-1, 1]`.
    #[inline]
    pub fn process_sample(&mut self, mic: f32, reference: f32) -> f32 {
        let detection = (mic - reference * self.coefficient).clamp(-1.0, 1.0);
        let clamp_max = self.parameters.clamp_max.max(0.0);

        if reference.abs() > REFERENCE_EPSILON {
            self.coefficient += self.parameters.adapt_rate * reference * detection;
        } else {
            let recovery = self.parameters.recovery_rate.clamp(0.0, 1.0);
            self.coefficient += (self.parameters.baseline - self.coefficient) * recovery;
        }
        self.coefficient = self.coefficient.clamp(0.0, clamp_max);

        detection
    }

    /// Cancels a block in place. `reference` yields the backing-track sample
    /// aligned with each microphone sample.
    pub fn process_block(&mut self, block: &mut [f32], reference: impl IntoIterator<Item = f32>) {
        let mut reference = reference.into_iter();
        for sample in block.iter_mut() {
            let reference = reference.next().unwrap_or(0.0);
            *sample = self.process_sample(*sample, reference);
        }
    }
}

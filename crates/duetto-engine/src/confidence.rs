use duetto_bridge::config::ConfidenceConfig;

/// Energy gate value at or below which pitch confidence is discarded.
const PITCH_SILENCE_GATE: f32 = 0.01;
/// Energy gate value below which pitch confidence is scaled down.
const PITCH_WEAK_GATE: f32 = 0.2;

/// Result of scoring a single block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceScore {
    /// Blended confidence in `[0, 1]`.
    pub confidence: f32,
    /// Energy gate in `[0, 1]` derived from the block RMS.
    pub energy_gate: f32,
    /// Pitch confidence after energy gating.
    pub pitch_confidence: f32,
}

/// Blends VAD probability, pitch confidence and block energy into one score.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn configure(&mut self, config: ConfidenceConfig) {
        self.config = config;
    }

    /// Maps `rms` linearly from the silence floor (0) to the full-scale
    /// reference (1).
    pub fn energy_gate(&self, rms: f32) -> f32 {
        let floor = self.config.silence_floor_rms;
        let span = self.config.full_scale_rms - floor;
        if span <= f32::EPSILON {
            return if rms > floor { 1.0 } else { 0.0 };
        }
        ((rms - floor) / span).clamp(0.0, 1.0)
    }

    pub fn score(&self, rms: f32, vad_probability: f32, pitch_confidence: f32) -> ConfidenceScore {
        let energy_gate = self.energy_gate(rms);

        let pitch_confidence = if energy_gate <= PITCH_SILENCE_GATE {
            0.0
        } else if energy_gate < PITCH_WEAK_GATE {
            pitch_confidence * energy_gate
        } else {
            pitch_confidence
        };

        let gated_vad = vad_probability * energy_gate;
        let weighted = self.config.vad_weight * gated_vad
            + self.config.pitch_weight * (pitch_confidence * energy_gate);

        ConfidenceScore {
            confidence: weighted.max(gated_vad).clamp(0.0, 1.0),
            energy_gate,
            pitch_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(ConfidenceConfig::default())
    }

    #[test]
    fn silence_scores_zero() {
        let score = scorer().score(0.0, 1.0, 1.0);
        assert_eq!(score.energy_gate, 0.0);
        assert_eq!(score.pitch_confidence, 0.0);
        assert_eq!(score.confidence, 0.0);
    }

    #[test]
    fn loud_voice_uses_the_larger_of_both_terms() {
        let score = scorer().score(0.2, 0.9, 0.5);
        assert_eq!(score.energy_gate, 1.0);
        // weighted = 0.6*0.9 + 0.4*0.5 = 0.74 < 0.9
        assert!((score.confidence - 0.9).abs() < 1e-6);

        let score = scorer().score(0.2, 0.5, 1.0);
        // weighted = 0.3 + 0.4 = 0.7 > 0.5
        assert!((score.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn weak_energy_scales_pitch_confidence() {
        let scorer = scorer();
        let rms = 0.001 + 0.1 * (0.05 - 0.001);
        let score = scorer.score(rms, 0.0, 1.0);
        assert!((score.energy_gate - 0.1).abs() < 1e-4);
        assert!((score.pitch_confidence - 0.1).abs() < 1e-4);
    }

    #[test]
    fn near_silence_discards_pitch() {
        let scorer = scorer();
        let rms = 0.001 + 0.005 * (0.05 - 0.001);
        let score = scorer.score(rms, 0.0, 1.0);
        assert_eq!(score.pitch_confidence, 0.0);
        assert_eq!(score.confidence, 0.0);
    }
}

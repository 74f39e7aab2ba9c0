use std::sync::Arc;

use duetto_audio::{
    mixer::mix_planar_to_mono,
    resampler::{ResamplerError, conform_to_rate},
};
use duetto_bridge::media::TrackBuffer;

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("track contains no audio")]
    Empty,
    #[error("track has an invalid sample rate of {0} Hz")]
    InvalidSampleRate(u32),
    #[error("failed to resample track: {0}")]
    Resample(#[from] ResamplerError),
}

/// A reference track mixed to mono and conformed to the engine rate.
///
/// Samples are shared, so handing the track to background analysis never
/// copies the audio.
#[derive(Debug, Clone, Default)]
pub struct MonoTrack {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl MonoTrack {
    /// Mixes `buffer` down to mono and resamples it to `target_rate`.
    pub fn conform(buffer: &TrackBuffer, target_rate: u32) -> Result<Self, TrackError> {
        if buffer.sample_rate == 0 {
            return Err(TrackError::InvalidSampleRate(buffer.sample_rate));
        }
        let mono = mix_planar_to_mono(&buffer.channels);
        if mono.is_empty() {
            return Err(TrackError::Empty);
        }

        let samples = conform_to_rate(&mono, buffer.sample_rate, target_rate)?;
        Ok(Self {
            samples: samples.into(),
            sample_rate: target_rate,
        })
    }

    /// A silent track standing in for one that failed to load.
    pub fn silent(sample_rate: u32) -> Self {
        Self {
            samples: Arc::from(Vec::new()),
            sample_rate,
        }
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Returns the track at `target_rate`. A track already at that rate, or
    /// an empty one, shares its samples.
    pub fn resampled(&self, target_rate: u32) -> Result<Self, TrackError> {
        if target_rate == 0 {
            return Err(TrackError::InvalidSampleRate(target_rate));
        }
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Ok(Self {
                samples: self.samples.clone(),
                sample_rate: target_rate,
            });
        }
        if self.sample_rate == 0 {
            return Err(TrackError::InvalidSampleRate(self.sample_rate));
        }

        let samples = conform_to_rate(&self.samples, self.sample_rate, target_rate)?;
        Ok(Self {
            samples: samples.into(),
            sample_rate: target_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate.max(1))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub(crate) fn shared_samples(&self) -> Arc<[f32]> {
        self.samples.clone()
    }
}

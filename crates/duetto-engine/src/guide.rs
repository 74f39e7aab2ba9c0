//! Guide vocal pitch contour and the live pitch-shift ratio.
//!
//! The contour is computed once per guide load by a background job. Every
//! load takes a new generation from [`GuideTrackSlot`]; a job whose
//! generation is no longer the latest stops early, and its result is refused
//! at commit time.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use duetto_audio::frames::{decimate_into, samples_at_rate};
use duetto_inference::{
    pitch::{PitchEstimate, PitchExtractor},
    worker::InferenceClient,
};

/// Live pitch confidence below which the ratio is held.
const LIVE_CONFIDENCE_GUARD: f32 = 0.2;
/// Guide pitch confidence below which the ratio is held.
const GUIDE_CONFIDENCE_GUARD: f32 = 0.1;
const MIN_RATIO: f32 = 0.5;
const MAX_RATIO: f32 = 2.5;
/// Per-block one-pole factor applied to ratio changes.
const RATIO_SMOOTHING: f32 = 0.1;

/// Precomputed pitch contour of a guide vocal, one estimate per hop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuidePitchTrack {
    hop_seconds: f64,
    duration_seconds: f64,
    points: Vec<PitchEstimate>,
}

impl GuidePitchTrack {
    pub fn new(hop_seconds: f64, duration_seconds: f64, points: Vec<PitchEstimate>) -> Self {
        Self {
            hop_seconds,
            duration_seconds,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn hop_seconds(&self) -> f64 {
        self.hop_seconds
    }

    pub fn points(&self) -> &[PitchEstimate] {
        &self.points
    }

    /// Guide estimate at `time_seconds`. When `looping`, the time is first
    /// wrapped into the guide's duration; the hop index is clamped to the
    /// contour either way.
    pub fn at(&self, time_seconds: f64, looping: bool) -> Option<PitchEstimate> {
        if self.points.is_empty() || self.hop_seconds <= 0.0 {
            return None;
        }

        let mut time = time_seconds.max(0.0);
        if looping && self.duration_seconds > 0.0 {
            time = time.rem_euclid(self.duration_seconds);
        }

        let index = ((time / self.hop_seconds).floor() as usize).min(self.points.len() - 1);
        self.points.get(index).copied()
    }
}

/// Identifies one guide analysis run.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl GenerationToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer analysis has been requested since this one.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }
}

/// Holds the committed guide contour and the latest requested generation.
#[derive(Debug, Default)]
pub struct GuideTrackSlot {
    latest: Arc<AtomicU64>,
    track: Option<Arc<GuidePitchTrack>>,
}

impl GuideTrackSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, superseding every run in flight. The
    /// previously committed contour is dropped since it belongs to the old
    /// guide.
    pub fn begin(&mut self) -> GenerationToken {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        self.track = None;
        GenerationToken {
            generation,
            latest: self.latest.clone(),
        }
    }

    /// Stores `track` if `generation` is still the latest. Returns whether
    /// the track was committed.
    pub fn commit(&mut self, generation: u64, track: GuidePitchTrack) -> bool {
        if self.latest.load(Ordering::Acquire) != generation {
            return false;
        }
        self.track = Some(Arc::new(track));
        true
    }

    /// Supersedes every run in flight without starting a new one.
    pub fn invalidate(&mut self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    pub fn track(&self) -> Option<&GuidePitchTrack> {
        self.track.as_deref()
    }
}

/// Geometry of a guide analysis, in guide-rate samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisPlan {
    pub guide_rate: u32,
    pub hop_samples: usize,
    pub window_samples: usize,
    pub frame_samples: usize,
}

impl AnalysisPlan {
    /// Hops by one live block and windows one pitch frame, both converted to
    /// the guide rate.
    pub fn new(
        engine_rate: u32,
        block_size: usize,
        model_rate: u32,
        frame_samples: usize,
        guide_rate: u32,
    ) -> Self {
        Self {
            guide_rate,
            hop_samples: samples_at_rate(block_size, engine_rate, guide_rate).max(1),
            window_samples: samples_at_rate(frame_samples, model_rate, guide_rate).max(1),
            frame_samples,
        }
    }

    pub fn hop_seconds(&self) -> f64 {
        self.hop_samples as f64 / f64::from(self.guide_rate.max(1))
    }

    pub fn hop_count(&self, samples: usize) -> usize {
        samples.div_ceil(self.hop_samples)
    }
}

/// Result of a finished guide analysis.
#[derive(Debug)]
pub struct GuideAnalysis {
    pub generation: u64,
    pub track: GuidePitchTrack,
}

/// A pending guide analysis, ready to be driven on any task.
pub struct GuideAnalysisJob {
    pub(crate) token: GenerationToken,
    pub(crate) samples: Arc<[f32]>,
    pub(crate) plan: AnalysisPlan,
    pub(crate) client: InferenceClient,
}

impl GuideAnalysisJob {
    pub fn generation(&self) -> u64 {
        self.token.generation()
    }

    /// Walks the guide hop by hop through the pitch model, yielding to the
    /// scheduler after every hop. Returns `None` when a newer guide load
    /// superseded this run.
    pub async fn run(self) -> Option<GuideAnalysis> {
        let Self {
            token,
            samples,
            plan,
            client,
        } = self;

        let hops = plan.hop_count(samples.len());
        let mut extractor = PitchExtractor::new();
        let mut window = vec![0.0f32; plan.window_samples];
        let mut points = Vec::with_capacity(hops);

        for hop in 0..hops {
            if !token.is_current() {
                log::debug!("Guide analysis {} superseded after {hop} hops", token.generation());
                return None;
            }

            let start = hop * plan.hop_samples;
            let end = (start + plan.window_samples).min(samples.len());
            let filled = end - start;
            window[..filled].copy_from_slice(&samples[start..end]);
            window[filled..].fill(0.0);

            let mut frame = vec![0.0f32; plan.frame_samples];
            decimate_into(&window, &mut frame);
            points.push(extractor.accept(client.pitch_salience(frame).await));

            tokio::task::yield_now().await;
        }

        if !token.is_current() {
            log::debug!("Guide analysis {} superseded on completion", token.generation());
            return None;
        }

        let duration_seconds = samples.len() as f64 / f64::from(plan.guide_rate.max(1));
        Some(GuideAnalysis {
            generation: token.generation(),
            track: GuidePitchTrack::new(plan.hop_seconds(), duration_seconds, points),
        })
    }
}

/// Smoothed guide pitch-shift ratio.
#[derive(Debug, Clone)]
pub struct PitchRatioTracker {
    ratio: f32,
}

impl Default for PitchRatioTracker {
    fn default() -> Self {
        Self { ratio: 1.0 }
    }
}

impl PitchRatioTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn reset(&mut self) {
        self.ratio = 1.0;
    }

    /// Moves the ratio toward `live / guide`. Unreliable live or guide
    /// estimates leave the previous ratio untouched.
    pub fn update(&mut self, live: PitchEstimate, guide: Option<PitchEstimate>) -> f32 {
        if live.confidence < LIVE_CONFIDENCE_GUARD || live.frequency_hz <= 0.0 {
            return self.ratio;
        }
        let Some(guide) = guide else {
            return self.ratio;
        };
        if guide.confidence < GUIDE_CONFIDENCE_GUARD || guide.frequency_hz <= 0.0 {
            return self.ratio;
        }

        let target = (live.frequency_hz / guide.frequency_hz).clamp(MIN_RATIO, MAX_RATIO);
        self.ratio += (target - self.ratio) * RATIO_SMOOTHING;
        self.ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(frequency_hz: f32, confidence: f32) -> PitchEstimate {
        PitchEstimate {
            frequency_hz,
            confidence,
        }
    }

    #[test]
    fn lookup_uses_floor_of_hop_and_clamps() {
        let track = GuidePitchTrack::new(
            0.5,
            1.5,
            vec![estimate(100.0, 1.0), estimate(200.0, 1.0), estimate(300.0, 1.0)],
        );
        assert_eq!(track.at(0.0, false).map(|p| p.frequency_hz), Some(100.0));
        assert_eq!(track.at(0.99, false).map(|p| p.frequency_hz), Some(200.0));
        assert_eq!(track.at(10.0, false).map(|p| p.frequency_hz), Some(300.0));
        // 1.75 wraps to 0.25 within a 1.5 s guide
        assert_eq!(track.at(1.75, true).map(|p| p.frequency_hz), Some(100.0));
        assert_eq!(GuidePitchTrack::default().at(0.0, true), None);
    }

    #[test]
    fn stale_generations_are_refused() {
        let mut slot = GuideTrackSlot::new();
        let first = slot.begin();
        let second = slot.begin();
        assert!(!first.is_current());
        assert!(second.is_current());

        assert!(!slot.commit(first.generation(), GuidePitchTrack::default()));
        assert!(slot.track().is_none());
        let track = GuidePitchTrack::new(0.1, 0.1, vec![estimate(1.0, 1.0)]);
        assert!(slot.commit(second.generation(), track));
        assert_eq!(slot.track().map(GuidePitchTrack::len), Some(1));

        slot.invalidate();
        assert!(!second.is_current());
    }

    #[test]
    fn plan_converts_hop_and_window_to_guide_rate() {
        let plan = AnalysisPlan::new(48_000, 128, 16_000, 1024, 44_100);
        assert_eq!(plan.hop_samples, 118);
        assert_eq!(plan.window_samples, 2822);
        assert_eq!(plan.hop_count(1180), 10);
        assert_eq!(plan.hop_count(1181), 11);
    }

    #[test]
    fn ratio_follows_reliable_pitch() {
        let mut tracker = PitchRatioTracker::new();
        let ratio = tracker.update(estimate(440.0, 0.9), Some(estimate(220.0, 0.9)));
        assert!((ratio - 1.1).abs() < 1e-6);
        for _ in 0..200 {
            tracker.update(estimate(440.0, 0.9), Some(estimate(220.0, 0.9)));
        }
        assert!((tracker.ratio() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn ratio_is_clamped() {
        let mut tracker = PitchRatioTracker::new();
        for _ in 0..500 {
            tracker.update(estimate(2000.0, 1.0), Some(estimate(100.0, 1.0)));
        }
        assert!((tracker.ratio() - 2.5).abs() < 1e-3);
    }

    #[test]
    fn weak_estimates_hold_the_ratio() {
        let mut tracker = PitchRatioTracker::new();
        tracker.update(estimate(300.0, 0.9), Some(estimate(200.0, 0.9)));
        let held = tracker.ratio();

        assert_eq!(tracker.update(estimate(1000.0, 0.1), Some(estimate(200.0, 0.9))), held);
        assert_eq!(tracker.update(estimate(0.0, 0.9), Some(estimate(200.0, 0.9))), held);
        assert_eq!(tracker.update(estimate(300.0, 0.9), Some(estimate(200.0, 0.05))), held);
        assert_eq!(tracker.update(estimate(300.0, 0.9), Some(estimate(0.0, 0.9))), held);
        assert_eq!(tracker.update(estimate(300.0, 0.9), None), held);
    }
}

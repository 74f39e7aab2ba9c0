use duetto_audio::{
    block_rms,
    frames::{AnalysisFrame, FrameAccumulator, FrameKind},
};
use duetto_bridge::{
    config::{Config, ManualMode},
    media::{CalibrationResult, MeterSnapshot, MixParameters, TelemetryEntry},
};
use duetto_inference::{
    pitch::{PitchEstimate, PitchExtractor},
    vad::{VadExtractor, VadState},
    worker::InferenceClient,
};

use crate::{
    block_duration_ms,
    calibration::Calibrator,
    confidence::ConfidenceScorer,
    dynamics::{DynamicsInput, DynamicsShaper},
    gate::ConfidenceGate,
    guide::{AnalysisPlan, GuideAnalysis, GuideAnalysisJob, GuideTrackSlot, PitchRatioTracker},
    leak::LeakCanceller,
    playback::{PlaybackScheduler, TransportState},
    queue::BlockQueue,
    telemetry::{TelemetryError, TelemetryLog},
    track::MonoTrack,
    tuning::DerivedCoefficients,
};

/// Everything a single processed block produced.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockReport {
    pub mix: MixParameters,
    pub meter: MeterSnapshot,
    /// Set on the block that completed a calibration run.
    pub calibration: Option<CalibrationResult>,
}

/// Per-session vocal-assist engine.
///
/// Blocks are appended with [`enqueue`](Self::enqueue) and processed one by
/// one, in arrival order, by [`process_next`](Self::process_next).
/// Configuration only reaches the engine through
/// [`apply_config`](Self::apply_config).
pub struct AudioEngine {
    config: Config,
    coefficients: DerivedCoefficients,
    sample_rate: u32,
    block_ms: f32,

    inference: InferenceClient,
    queue: BlockQueue<Vec<f32>>,
    accumulator: FrameAccumulator,
    frames: Vec<AnalysisFrame>,
    detection: Vec<f32>,
    vad_state: VadState,
    vad_extractor: VadExtractor,
    pitch_extractor: PitchExtractor,
    last_vad: f32,
    last_pitch: PitchEstimate,

    leak: LeakCanceller,
    scorer: ConfidenceScorer,
    gate: ConfidenceGate,
    dynamics: DynamicsShaper,
    ratio: PitchRatioTracker,
    playback: PlaybackScheduler,

    instrument: MonoTrack,
    guide: MonoTrack,
    guide_slot: GuideTrackSlot,
    guide_muted: bool,

    telemetry: TelemetryLog,
    calibrator: Calibrator,
    processed_blocks: u64,
    disposed: bool,
}

impl AudioEngine {
    pub fn new(config: &Config, inference: InferenceClient) -> Self {
        let engine = &config.engine;
        let models = &config.models;
        let coefficients = DerivedCoefficients::from_config(config);
        let block_ms = block_duration_ms(engine.block_size, engine.sample_rate);

        let mut gate = ConfidenceGate::new(config.gate.clone(), block_ms);
        gate.set_manual_mode(config.tuning.manual_mode);

        Self {
            sample_rate: engine.sample_rate,
            block_ms,
            inference,
            queue: BlockQueue::new(engine.queue_capacity),
            accumulator: FrameAccumulator::new(
                engine.sample_rate,
                models.model_sample_rate,
                models.vad_frame_samples,
                models.pitch_frame_samples,
            ),
            frames: Vec::new(),
            detection: Vec::with_capacity(engine.block_size),
            vad_state: VadState::zeroed(models.vad_state_len),
            vad_extractor: VadExtractor::new(),
            pitch_extractor: PitchExtractor::new(),
            last_vad: 0.0,
            last_pitch: PitchEstimate::default(),
            leak: LeakCanceller::new(coefficients.leak),
            scorer: ConfidenceScorer::new(config.confidence.clone()),
            gate,
            dynamics: DynamicsShaper::new(coefficients.dynamics, block_ms),
            ratio: PitchRatioTracker::new(),
            playback: PlaybackScheduler::new(engine.sample_rate, config.media.loop_playback),
            instrument: MonoTrack::silent(engine.sample_rate),
            guide: MonoTrack::silent(engine.sample_rate),
            guide_slot: GuideTrackSlot::new(),
            guide_muted: false,
            telemetry: TelemetryLog::new(engine.telemetry_capacity),
            calibrator: Calibrator::new(),
            processed_blocks: 0,
            disposed: false,
            coefficients,
            config: config.clone(),
        }
    }

    /// Applies a new configuration, recomputing every derived coefficient.
    ///
    /// Changing the block geometry or the model framing restarts analysis
    /// from a zeroed VAD state; changing the gate timing resets the gate.
    /// A new engine rate also re-conforms both loaded tracks and keeps the
    /// playback position in seconds. Everything else keeps its memory.
    ///
    /// Returns a fresh guide analysis job when the loaded guide's contour no
    /// longer matches the new geometry.
    pub fn apply_config(&mut self, config: &Config) -> Option<GuideAnalysisJob> {
        let rate_changed = config.engine.sample_rate != self.config.engine.sample_rate;
        let geometry_changed = rate_changed
            || config.engine.block_size != self.config.engine.block_size
            || config.models != self.config.models;

        self.coefficients = DerivedCoefficients::from_config(config);
        self.sample_rate = config.engine.sample_rate;
        self.block_ms = block_duration_ms(config.engine.block_size, config.engine.sample_rate);

        if geometry_changed {
            let models = &config.models;
            self.accumulator = FrameAccumulator::new(
                config.engine.sample_rate,
                models.model_sample_rate,
                models.vad_frame_samples,
                models.pitch_frame_samples,
            );
            self.vad_state = VadState::zeroed(models.vad_state_len);
            self.last_vad = 0.0;
            self.last_pitch = PitchEstimate::default();
        }
        if rate_changed {
            let rate = config.engine.sample_rate;
            self.instrument = conform_loaded(&self.instrument, rate, "instrument");
            self.guide = conform_loaded(&self.guide, rate, "guide");
            self.playback.set_sample_rate(rate);
            self.update_track_lengths();
        }

        if geometry_changed || config.gate != self.config.gate {
            self.gate.configure(config.gate.clone(), self.block_ms);
        }
        self.gate.set_manual_mode(config.tuning.manual_mode);

        self.scorer.configure(config.confidence.clone());
        self.leak.configure(self.coefficients.leak);
        self.dynamics.configure(self.coefficients.dynamics, self.block_ms);
        self.playback.set_looping(config.media.loop_playback);
        self.telemetry.set_capacity(config.engine.telemetry_capacity);
        let dropped = self.queue.set_capacity(config.engine.queue_capacity);
        if dropped > 0 {
            log::warn!("Dropped {dropped} queued blocks while shrinking the queue");
        }

        self.config = config.clone();

        if geometry_changed && !self.guide.is_empty() {
            let guide = self.guide.clone();
            return Some(self.load_guide(guide));
        }
        None
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coefficients(&self) -> &DerivedCoefficients {
        &self.coefficients
    }

    pub fn set_manual_mode(&mut self, mode: ManualMode) {
        self.config.tuning.manual_mode = mode;
        self.gate.set_manual_mode(mode);
    }

    pub fn load_instrument(&mut self, track: MonoTrack) {
        self.instrument = track;
        self.update_track_lengths();
    }

    /// Installs a new guide vocal and returns the analysis job for its pitch
    /// contour. Any analysis still running for an older guide is superseded.
    pub fn load_guide(&mut self, track: MonoTrack) -> GuideAnalysisJob {
        let plan = AnalysisPlan::new(
            self.sample_rate,
            self.config.engine.block_size,
            self.config.models.model_sample_rate,
            self.config.models.pitch_frame_samples,
            track.sample_rate(),
        );
        let samples = track.shared_samples();
        self.guide = track;
        self.update_track_lengths();
        self.ratio.reset();

        GuideAnalysisJob {
            token: self.guide_slot.begin(),
            samples,
            plan,
            client: self.inference.clone(),
        }
    }

    /// Commits a finished guide analysis. Returns `false` when it belongs to
    /// a superseded guide or the engine was disposed.
    pub fn commit_guide_analysis(&mut self, analysis: GuideAnalysis) -> bool {
        if self.disposed {
            return false;
        }
        self.guide_slot.commit(analysis.generation, analysis.track)
    }

    pub fn guide_slot(&self) -> &GuideTrackSlot {
        &self.guide_slot
    }

    fn update_track_lengths(&mut self) {
        self.playback.set_track_lengths(self.instrument.len(), self.guide.len());
    }

    pub fn play(&mut self) {
        self.playback.play();
    }

    pub fn pause(&mut self) {
        self.playback.pause();
    }

    pub fn stop(&mut self) {
        self.playback.stop();
    }

    pub fn seek(&mut self, seconds: f64) {
        self.playback.seek(seconds);
    }

    pub fn transport_state(&self) -> TransportState {
        self.playback.state()
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn set_guide_mute(&mut self, muted: bool) {
        self.guide_muted = muted;
    }

    pub fn guide_muted(&self) -> bool {
        self.guide_muted
    }

    /// Starts a calibration run on the raw microphone signal and clears the
    /// telemetry ring.
    pub fn start_calibration(&mut self, duration_seconds: f32) {
        self.calibrator.start(self.sample_rate, duration_seconds);
        self.telemetry.reset();
    }

    pub fn telemetry(&self) -> &TelemetryLog {
        &self.telemetry
    }

    pub fn export_telemetry(&self) -> Result<String, TelemetryError> {
        self.telemetry.export_json()
    }

    pub fn gate(&self) -> &ConfidenceGate {
        &self.gate
    }

    pub fn dynamics(&self) -> &DynamicsShaper {
        &self.dynamics
    }

    pub fn leak(&self) -> &LeakCanceller {
        &self.leak
    }

    pub fn pitch_ratio(&self) -> f32 {
        self.ratio.ratio()
    }

    /// Appends a block to the processing queue and returns how many of the
    /// oldest blocks were dropped to make room.
    pub fn enqueue(&mut self, block: Vec<f32>) -> usize {
        if self.disposed {
            return 0;
        }
        let dropped = self.queue.push(block);
        if dropped > 0 {
            log::warn!(
                "Block queue overflow: dropped {dropped} oldest blocks ({} in total)",
                self.queue.dropped_total()
            );
        }
        dropped
    }

    pub fn queued_blocks(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.queue.dropped_total()
    }

    /// Processes the oldest queued block, if any.
    pub async fn process_next(&mut self) -> Option<BlockReport> {
        if self.disposed {
            return None;
        }
        let block = self.queue.pop()?;
        Some(self.process_block(&block).await)
    }

    /// Runs one block through the whole pipeline. Never fails: inference
    /// problems degrade the affected feature to zero.
    pub async fn process_block(&mut self, block: &[f32]) -> BlockReport {
        let input_rms = block_rms(block);
        let calibration = self.calibrator.process(block);

        let position = self.playback.cursor();
        self.cancel_leak(block, position);

        let mut frames = std::mem::take(&mut self.frames);
        self.accumulator.push(&self.detection, &mut frames);
        self.extract_features(&mut frames).await;
        self.frames = frames;

        let detection_rms = block_rms(&self.detection);
        let score = self.scorer.score(detection_rms, self.last_vad, self.last_pitch.confidence);
        let gate_db = self.gate.update(score.confidence);
        let gate_linear = self.gate.gain_linear();

        let dynamics = self.dynamics.process(DynamicsInput {
            block: &self.detection,
            gate: self.gate.normalized_gain(),
            confidence: score.confidence,
            playing: self.playback.is_playing(),
            guide_muted: self.guide_muted,
        });

        let live = PitchEstimate {
            frequency_hz: self.last_pitch.frequency_hz,
            confidence: score.pitch_confidence,
        };
        let time_seconds = position as f64 / f64::from(self.sample_rate.max(1));
        let guide = self
            .guide_slot
            .track()
            .and_then(|track| track.at(time_seconds, self.playback.is_looping()));
        let pitch_ratio = self.ratio.update(live, guide);

        self.playback.advance(block.len());

        self.telemetry.record(TelemetryEntry {
            timestamp_ms: self.processed_blocks as f64 * f64::from(self.block_ms),
            vad: self.last_vad,
            pitch: self.last_pitch.confidence,
            confidence: score.confidence,
            gain_db: gate_db,
        });
        self.processed_blocks += 1;

        let guide_gain = self.coefficients.guide_gain;
        BlockReport {
            mix: MixParameters {
                monitor_gain: self.coefficients.monitor_gain,
                gate_gain: gate_linear,
                pitch_ratio,
                guide_dry_level: (dynamics.guide_envelope * guide_gain).clamp(0.0, 1.0),
                guide_tail_level: (dynamics.tail_send * guide_gain).clamp(0.0, 1.0),
                tail_decay_seconds: self.coefficients.dynamics.tail_seconds,
                low_shelf_db: dynamics.low_shelf_db,
                high_shelf_db: dynamics.high_shelf_db,
            },
            meter: MeterSnapshot {
                input_rms,
                output_rms: (input_rms * gate_linear).min(1.0),
                vad: self.last_vad,
                pitch: self.last_pitch.frequency_hz,
                confidence: score.confidence,
                vocal_strength: dynamics.vocal_strength,
                gate_db,
                pitch_ratio,
                dropped_blocks: self.queue.dropped_total(),
            },
            calibration,
        }
    }

    /// Writes the leak-cancelled block into `self.detection`.
    fn cancel_leak(&mut self, block: &[f32], position: u64) {
        self.detection.clear();
        self.detection.extend_from_slice(block);

        let playing = self.playback.is_playing();
        let gain = self.coefficients.instrument_gain;
        let instrument = self.instrument.samples();
        let playback = &self.playback;
        let reference = (0..block.len() as u64).map(|index| {
            if !playing {
                return 0.0;
            }
            playback
                .offset_in(position + index, instrument.len())
                .map_or(0.0, |offset| instrument[offset] * gain)
        });
        self.leak.process_block(&mut self.detection, reference);
    }

    async fn extract_features(&mut self, frames: &mut Vec<AnalysisFrame>) {
        // voice activity first, then pitch, each in completion order
        for frame in frames.iter_mut().filter(|frame| frame.kind == FrameKind::Vad) {
            let samples = std::mem::take(&mut frame.samples);
            let result = self.inference.detect_voice(samples, self.vad_state.clone()).await;
            self.last_vad = self.vad_extractor.accept(result, &mut self.vad_state);
        }
        for frame in frames.iter_mut().filter(|frame| frame.kind == FrameKind::Pitch) {
            let samples = std::mem::take(&mut frame.samples);
            let result = self.inference.pitch_salience(samples).await;
            self.last_pitch = self.pitch_extractor.accept(result);
        }
        frames.clear();
    }

    /// Ends the session: supersedes guide analyses, drops queued blocks and
    /// stops the transport. No block is processed afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.guide_slot.invalidate();
        self.queue.clear();
        self.playback.stop();
        log::info!("Audio engine disposed after {} blocks", self.processed_blocks);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Re-conforms a loaded track to a new engine rate, falling back to silence
/// when resampling fails.
fn conform_loaded(track: &MonoTrack, sample_rate: u32, label: &str) -> MonoTrack {
    match track.resampled(sample_rate) {
        Ok(track) => track,
        Err(err) => {
            log::error!("Failed to move the {label} track to {sample_rate} Hz: {err}");
            MonoTrack::silent(sample_rate)
        }
    }
}

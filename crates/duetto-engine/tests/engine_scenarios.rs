use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use duetto_bridge::config::{Config, ManualMode};
use duetto_engine::{AudioEngine, track::MonoTrack};
use duetto_inference::{
    InferenceError, PitchSalienceModel, SALIENCE_BINS, UnavailableModel, VoiceActivityModel,
    vad::{VadOutput, VadState},
    worker::{InferenceClient, ModelSet},
};

const BLOCK: usize = 128;
const LOW_BIN: usize = 100;
const HIGH_BIN: usize = 130;

/// Voice-activity model returning a fixed probability.
struct FixedVad(f32);

impl VoiceActivityModel for FixedVad {
    fn infer(&mut self, _: &[f32], state: &VadState, _: i64) -> Result<VadOutput, InferenceError> {
        Ok(VadOutput {
            probability: self.0,
            state: state.clone(),
        })
    }
}

/// Pitch model whose peak bin depends on the frame level: quiet frames map
/// to `LOW_BIN`, loud ones to `HIGH_BIN`. The peak salience is shared so
/// tests can change it while the engine runs.
struct LevelPitch {
    peak: Arc<Mutex<f32>>,
}

impl PitchSalienceModel for LevelPitch {
    fn salience(&mut self, frame: &[f32]) -> Result<Vec<f32>, InferenceError> {
        let mean = frame.iter().map(|sample| sample.abs()).sum::<f32>() / frame.len().max(1) as f32;
        let bin = if mean > 0.3 { HIGH_BIN } else { LOW_BIN };
        let peak = *self.peak.lock().expect("salience lock");

        let mut salience = vec![0.0; SALIENCE_BINS];
        salience[bin] = peak;
        Ok(salience)
    }
}

fn engine_with(
    vad: Box<dyn VoiceActivityModel>,
    pitch: Box<dyn PitchSalienceModel>,
) -> AudioEngine {
    let config = Config::default();
    let client = InferenceClient::spawn(
        ModelSet {
            vad,
            pitch,
            sample_rate: config.models.model_sample_rate,
        },
        Duration::from_secs(2),
    )
    .expect("inference worker should start");
    AudioEngine::new(&config, client)
}

fn level_engine(peak: Arc<Mutex<f32>>) -> AudioEngine {
    engine_with(Box::new(FixedVad(0.9)), Box::new(LevelPitch { peak }))
}

#[tokio::test]
async fn silence_keeps_the_guide_ducked() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));
    engine.play();

    let silence = vec![0.0f32; BLOCK];
    let mut last = None;
    for _ in 0..50 {
        let report = engine.process_block(&silence).await;
        assert_eq!(report.meter.confidence, 0.0);
        last = Some(report);
    }

    let report = last.expect("blocks were processed");
    assert_eq!(report.meter.gate_db, -18.0);
    assert_eq!(engine.dynamics().envelope(), 0.0);
    assert_eq!(report.mix.guide_dry_level, 0.0);
}

#[tokio::test]
async fn weak_live_pitch_holds_the_ratio() {
    let peak = Arc::new(Mutex::new(1.0f32));
    let mut engine = level_engine(peak.clone());

    let guide = MonoTrack::from_samples(vec![0.1; 48_000], 48_000);
    let job = engine.load_guide(guide);
    let analysis = job.run().await.expect("analysis is current");
    assert!(engine.commit_guide_analysis(analysis));

    let loud = vec![0.5f32; BLOCK];
    for _ in 0..200 {
        engine.process_block(&loud).await;
    }
    // live sits 30 bins (600 cents) above the guide
    let target = 2f32.powf(0.5);
    let ratio = engine.pitch_ratio();
    assert!((ratio - target).abs() < 1e-3, "ratio {ratio} did not converge to {target}");

    *peak.lock().expect("salience lock") = 0.1;
    // let the next pitch frame carry the weak confidence
    for _ in 0..48 {
        engine.process_block(&loud).await;
    }
    let held = engine.pitch_ratio();
    for _ in 0..100 {
        let report = engine.process_block(&loud).await;
        assert_eq!(report.mix.pitch_ratio, held);
    }
}

#[tokio::test]
async fn ratio_tracks_live_over_guide_frequency() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));
    let job = engine.load_guide(MonoTrack::from_samples(vec![0.5; 9_600], 48_000));
    let analysis = job.run().await.expect("analysis is current");
    assert!(engine.commit_guide_analysis(analysis));

    // live and guide sit on the same bin, so the ratio stays at unity
    let loud = vec![0.5f32; BLOCK];
    for _ in 0..200 {
        engine.process_block(&loud).await;
    }
    assert!((engine.pitch_ratio() - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn loud_confident_singing_opens_the_gate() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));
    engine.play();

    let loud = vec![0.5f32; BLOCK];
    let mut report = None;
    for _ in 0..400 {
        report = Some(engine.process_block(&loud).await);
    }
    let report = report.expect("blocks were processed");
    assert!(report.meter.confidence > 0.7);
    assert!(report.meter.gate_db > -0.5);
    assert!(report.meter.output_rms <= 1.0);
    assert_eq!(engine.gate().target_db(), 0.0);
}

#[tokio::test]
async fn unavailable_models_degrade_to_zero() {
    let mut engine = engine_with(
        Box::new(UnavailableModel::new("vad")),
        Box::new(UnavailableModel::new("pitch")),
    );

    let loud = vec![0.5f32; BLOCK];
    for _ in 0..40 {
        let report = engine.process_block(&loud).await;
        assert_eq!(report.meter.vad, 0.0);
        assert_eq!(report.meter.pitch, 0.0);
        assert_eq!(report.meter.gate_db, -18.0);
    }
    assert_eq!(engine.telemetry().len(), 40);
}

#[tokio::test]
async fn manual_mode_overrides_silence() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));
    engine.set_manual_mode(ManualMode::AlwaysOn);

    let silence = vec![0.0f32; BLOCK];
    for _ in 0..50 {
        engine.process_block(&silence).await;
    }
    assert_eq!(engine.gate().target_db(), 0.0);
    assert!(engine.gate().gain_db() > -18.0);
    assert_eq!(engine.config().tuning.manual_mode, ManualMode::AlwaysOn);
}

#[tokio::test]
async fn queue_overflow_drops_oldest_blocks() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));

    let mut dropped = 0;
    for block in 0..40 {
        dropped += engine.enqueue(vec![block as f32 / 1000.0; BLOCK]);
    }
    assert_eq!(dropped, 8);
    assert_eq!(engine.queued_blocks(), 32);

    let mut processed = 0;
    while let Some(report) = engine.process_next().await {
        if processed == 0 {
            // block 8 is the oldest survivor
            assert!((report.meter.input_rms - 0.008).abs() < 1e-6);
        }
        assert_eq!(report.meter.dropped_blocks, 8);
        processed += 1;
    }
    assert_eq!(processed, 32);
}

#[tokio::test]
async fn newer_guide_supersedes_older_analysis() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));

    let first = engine.load_guide(MonoTrack::from_samples(vec![0.1; 4_800], 48_000));
    let second = engine.load_guide(MonoTrack::from_samples(vec![0.1; 4_800], 48_000));
    assert!(first.generation() < second.generation());

    assert!(first.run().await.is_none());
    let analysis = second.run().await.expect("latest analysis completes");
    assert_eq!(analysis.track.len(), 38);
    assert!(engine.commit_guide_analysis(analysis));
    assert_eq!(engine.guide_slot().track().map(|track| track.len()), Some(38));
}

#[tokio::test]
async fn disposed_engine_processes_nothing() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));
    engine.enqueue(vec![0.0; BLOCK]);
    let job = engine.load_guide(MonoTrack::from_samples(vec![0.1; 4_800], 48_000));

    engine.dispose();
    assert!(engine.is_disposed());
    assert!(engine.process_next().await.is_none());
    assert_eq!(engine.enqueue(vec![0.0; BLOCK]), 0);
    assert!(job.run().await.is_none());
}

#[tokio::test]
async fn calibration_reports_once_and_clears_telemetry() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));
    let block = vec![0.25f32; BLOCK];
    for _ in 0..5 {
        engine.process_block(&block).await;
    }

    // 480 samples at 48 kHz complete on the fourth block
    engine.start_calibration(0.01);
    assert!(engine.telemetry().is_empty());

    let mut results = Vec::new();
    for _ in 0..6 {
        if let Some(result) = engine.process_block(&block).await.calibration {
            results.push(result);
        }
    }
    assert_eq!(results.len(), 1);
    assert!((results[0].vocal_peak_db - (-12.0412)).abs() < 1e-3);

    let json = engine.export_telemetry().expect("telemetry exports");
    assert!(json.trim_start().starts_with('['));
    assert_eq!(engine.telemetry().len(), 6);
}

#[tokio::test]
async fn apply_config_updates_coefficients() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));
    let mut config = Config::default();
    config.tuning.mic_monitor_gain_db = 0.0;
    config.tuning.manual_mode = ManualMode::AlwaysOff;
    config.media.loop_playback = false;

    engine.apply_config(&config);
    assert_eq!(engine.coefficients().monitor_gain, 1.0);
    assert_eq!(engine.gate().manual_mode(), ManualMode::AlwaysOff);
    assert!(!engine.playback().is_looping());

    let report = engine.process_block(&[0.0; BLOCK]).await;
    assert_eq!(report.mix.monitor_gain, 1.0);
}

#[tokio::test]
async fn bleed_of_the_playing_instrument_is_cancelled() {
    let mut engine = engine_with(
        Box::new(FixedVad(0.9)),
        Box::new(UnavailableModel::new("pitch")),
    );
    let instrument: Vec<f32> = (0..48_000)
        .map(|n| (n as f32 * 0.05).sin() * 0.5)
        .collect();
    engine.load_instrument(MonoTrack::from_samples(instrument.clone(), 48_000));
    engine.play();

    // the mic hears nothing but the instrument at 0.6 of its level
    let mut last = None;
    for _ in 0..300 {
        let start = engine.playback().cursor() as usize;
        let block: Vec<f32> = instrument[start..start + BLOCK]
            .iter()
            .map(|sample| sample * 0.6)
            .collect();
        last = Some(engine.process_block(&block).await);
    }

    let coefficient = engine.leak().coefficient();
    assert!(
        (coefficient - 0.6).abs() < 0.01,
        "coefficient {coefficient} did not reach the bleed gain"
    );

    let report = last.expect("blocks were processed");
    assert!(report.meter.input_rms > 0.1);
    assert!(report.meter.confidence < 0.05, "bleed scored {}", report.meter.confidence);
}

#[tokio::test]
async fn rate_change_reconforms_loaded_tracks() {
    let mut engine = level_engine(Arc::new(Mutex::new(1.0)));
    engine.load_instrument(MonoTrack::from_samples(vec![0.1; 48_000], 48_000));
    let job = engine.load_guide(MonoTrack::from_samples(vec![0.1; 24_000], 48_000));
    let analysis = job.run().await.expect("analysis is current");
    assert!(engine.commit_guide_analysis(analysis));
    engine.seek(0.5);

    let mut config = Config::default();
    config.engine.sample_rate = 24_000;
    let job = engine
        .apply_config(&config)
        .expect("a loaded guide is analysed again");

    let playback = engine.playback();
    assert_eq!(playback.length(), 24_000);
    assert_eq!(playback.cursor(), 12_000);
    assert!((playback.position_seconds() - 0.5).abs() < 1e-9);
    // the old contour is superseded until the new analysis lands
    assert!(engine.guide_slot().track().is_none());

    let analysis = job.run().await.expect("analysis is current");
    assert_eq!(analysis.track.len(), 94);
    assert!(engine.commit_guide_analysis(analysis));

    let unchanged = engine.apply_config(&config);
    assert!(unchanged.is_none());
}

//! Engine session task.
//!
//! The session task is the only owner of the [`AudioEngine`]. Host commands,
//! captured blocks and finished guide analyses all reach it through channels,
//! so the engine itself never needs a lock.

use duetto_bridge::{
    MessageFromBackend,
    config::{Config, ManualMode},
    media::{MixParameters, TrackKind},
    notification::NotificationType,
};
use duetto_engine::{
    AudioEngine, BlockReport,
    guide::{GuideAnalysis, GuideAnalysisJob},
    telemetry::TelemetryError,
    track::MonoTrack,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::services::AppContextHandle;

const COMMAND_CAPACITY: usize = 32;
const ANALYSIS_CAPACITY: usize = 4;

/// Commands the rest of the backend can issue to the running session.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    ApplyConfig(Box<Config>),
    SetManualMode(ManualMode),
    LoadTrack(TrackKind, MonoTrack),
    Play,
    Pause,
    Stop,
    Seek(f64),
    SetGuideMute(bool),
    StartCalibration(f32),
    ExportTelemetry(oneshot::Sender<Result<String, TelemetryError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to the session task.
#[derive(Debug, Clone)]
pub(crate) struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    blocks: mpsc::Sender<Vec<f32>>,
}

impl SessionHandle {
    /// Sends a command to the session. Returns `false` once the session has
    /// ended.
    pub async fn command(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Sender used by the capture transport to deliver N-sample blocks.
    pub fn block_sender(&self) -> mpsc::Sender<Vec<f32>> {
        self.blocks.clone()
    }

    /// Disposes of the engine and waits until the session has acknowledged.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.command(SessionCommand::Shutdown(tx)).await {
            let _ = rx.await;
        }
    }
}

/// Spawns the session task around `engine` on the current runtime.
pub(crate) fn spawn_session(
    engine: AudioEngine,
    context: AppContextHandle,
    mix_tx: watch::Sender<MixParameters>,
) -> SessionHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    // the engine queue is the real bound, this channel only bridges threads
    let (blocks_tx, blocks_rx) = mpsc::channel(engine.config().engine.queue_capacity.max(1) * 2);
    let (analyses_tx, analyses_rx) = mpsc::channel(ANALYSIS_CAPACITY);

    let session = Session {
        engine,
        context,
        mix_tx,
        analyses_tx,
        processed_blocks: 0,
    };
    tokio::spawn(session.run(commands_rx, blocks_rx, analyses_rx));

    SessionHandle {
        commands: commands_tx,
        blocks: blocks_tx,
    }
}

struct Session {
    engine: AudioEngine,
    context: AppContextHandle,
    mix_tx: watch::Sender<MixParameters>,
    analyses_tx: mpsc::Sender<GuideAnalysis>,
    processed_blocks: u64,
}

enum Flow {
    Continue,
    Exit,
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut blocks: mpsc::Receiver<Vec<f32>>,
        mut analyses: mpsc::Receiver<GuideAnalysis>,
    ) {
        log::info!("Engine session started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if let Flow::Exit = self.handle_command(command).await {
                        break;
                    }
                }
                Some(block) = blocks.recv() => {
                    self.engine.enqueue(block);
                    self.drain(&mut blocks).await;
                }
                Some(analysis) = analyses.recv() => {
                    self.commit_analysis(analysis).await;
                }
            }
        }

        self.engine.dispose();
        log::info!("Engine session ended after {} blocks", self.processed_blocks);
    }

    /// Processes queued blocks in arrival order, picking up blocks that
    /// arrive in the meantime.
    async fn drain(&mut self, blocks: &mut mpsc::Receiver<Vec<f32>>) {
        loop {
            while let Ok(block) = blocks.try_recv() {
                self.engine.enqueue(block);
            }
            let Some(report) = self.engine.process_next().await else {
                break;
            };
            self.publish(report).await;
        }
    }

    async fn publish(&mut self, report: BlockReport) {
        self.processed_blocks += 1;
        self.mix_tx.send_replace(report.mix);

        let interval = u64::from(self.engine.config().engine.meter_interval_blocks.max(1));
        if self.processed_blocks % interval == 0 {
            // meters are lossy, a busy host just skips one
            let _ = self
                .context
                .tx
                .try_send(MessageFromBackend::MeterUpdate(report.meter));
        }

        if let Some(result) = report.calibration {
            log::info!(
                "Calibration completed: peak {:.1} dB, valid {}",
                result.vocal_peak_db,
                result.is_valid
            );
            self.context
                .send(MessageFromBackend::CalibrationCompleted(result))
                .await;

            let mut state = self.context.state.write().await;
            state.config.calibration = Some(result);
            if let Err(err) = crate::config::save_config(&state.config).await {
                log::error!("Failed to persist calibration result: {err}");
            }
        }
    }

    async fn commit_analysis(&mut self, analysis: GuideAnalysis) {
        let hops = analysis.track.len();
        if self.engine.commit_guide_analysis(analysis) {
            log::info!("Guide pitch track ready with {hops} hops");
            self.context
                .send(MessageFromBackend::GuideAnalysisCompleted { hops })
                .await;
        } else {
            log::debug!("Discarded a superseded guide analysis");
        }
    }

    /// Runs a guide analysis off the session task. The result comes back
    /// through the analyses channel.
    fn spawn_analysis(&self, job: GuideAnalysisJob) {
        let analyses_tx = self.analyses_tx.clone();
        tokio::spawn(async move {
            let generation = job.generation();
            match job.run().await {
                Some(analysis) => {
                    let _ = analyses_tx.send(analysis).await;
                }
                None => log::debug!("Guide analysis {generation} was superseded"),
            }
        });
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::ApplyConfig(config) => {
                if let Some(job) = self.engine.apply_config(&config) {
                    log::info!("Engine geometry changed, re-analysing the guide");
                    self.spawn_analysis(job);
                }
            }
            SessionCommand::SetManualMode(mode) => self.engine.set_manual_mode(mode),
            SessionCommand::LoadTrack(TrackKind::Instrument, track) => {
                self.engine.load_instrument(track);
            }
            SessionCommand::LoadTrack(TrackKind::Guide, track) => {
                let job = self.engine.load_guide(track);
                self.spawn_analysis(job);
            }
            SessionCommand::Play => self.engine.play(),
            SessionCommand::Pause => self.engine.pause(),
            SessionCommand::Stop => self.engine.stop(),
            SessionCommand::Seek(seconds) => self.engine.seek(seconds),
            SessionCommand::SetGuideMute(muted) => self.engine.set_guide_mute(muted),
            SessionCommand::StartCalibration(duration_seconds) => {
                self.engine.start_calibration(duration_seconds);
                self.context
                    .send_notification(
                        NotificationType::Info,
                        format!("Calibrating for {duration_seconds:.0} s, sing at full level."),
                    )
                    .await;
            }
            SessionCommand::ExportTelemetry(reply) => {
                let _ = reply.send(self.engine.export_telemetry());
            }
            SessionCommand::Shutdown(reply) => {
                self.engine.dispose();
                let _ = reply.send(());
                return Flow::Exit;
            }
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use duetto_inference::{
        UnavailableModel,
        worker::{InferenceClient, ModelSet},
    };
    use tokio::sync::RwLock;

    use super::*;
    use crate::{AppContext, state::State};

    fn test_context() -> (AppContextHandle, mpsc::Receiver<MessageFromBackend>) {
        let (tx, rx) = mpsc::channel(64);
        let state = State {
            config: Config::default(),
            cache_path: std::env::temp_dir(),
            active_host: Arc::new(cpal::default_host()),
            active_audio_device: None,
            transport: None,
            session: None,
        };
        let context = AppContext {
            state: Arc::new(RwLock::new(state)),
            tx,
        };
        (Arc::new(context), rx)
    }

    fn test_engine() -> AudioEngine {
        let config = Config::default();
        let client = InferenceClient::spawn(
            ModelSet {
                vad: Box::new(UnavailableModel::new("vad")),
                pitch: Box::new(UnavailableModel::new("pitch")),
                sample_rate: config.models.model_sample_rate,
            },
            Duration::from_millis(50),
        )
        .expect("inference worker should start");
        AudioEngine::new(&config, client)
    }

    async fn next_event(events: &mut mpsc::Receiver<MessageFromBackend>) -> MessageFromBackend {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event should arrive in time")
            .expect("bridge should stay open")
    }

    #[tokio::test]
    async fn blocks_publish_mix_and_decimated_meters() {
        let (context, mut events) = test_context();
        let (mix_tx, mut mix_rx) = watch::channel(MixParameters::default());
        let session = spawn_session(test_engine(), context, mix_tx);

        let blocks = session.block_sender();
        for _ in 0..32 {
            blocks
                .send(vec![0.0; 128])
                .await
                .expect("session should accept blocks");
        }

        for _ in 0..2 {
            let event = next_event(&mut events).await;
            assert!(matches!(event, MessageFromBackend::MeterUpdate(_)));
        }

        mix_rx.changed().await.expect("mix sender is alive");
        let mix = *mix_rx.borrow();
        assert!((mix.monitor_gain - 0.501_187).abs() < 1e-5);
        assert_eq!(mix.guide_dry_level, 0.0);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn guide_load_reports_the_analysed_contour() {
        let (context, mut events) = test_context();
        let (mix_tx, _mix_rx) = watch::channel(MixParameters::default());
        let session = spawn_session(test_engine(), context, mix_tx);

        let guide = MonoTrack::from_samples(vec![0.1; 4_800], 48_000);
        assert!(session.command(SessionCommand::LoadTrack(TrackKind::Guide, guide)).await);

        match next_event(&mut events).await {
            MessageFromBackend::GuideAnalysisCompleted { hops } => assert_eq!(hops, 38),
            other => panic!("unexpected event {other:?}"),
        }
        session.shutdown().await;
    }

    #[tokio::test]
    async fn rate_change_reanalyses_the_loaded_guide() {
        let (context, mut events) = test_context();
        let (mix_tx, _mix_rx) = watch::channel(MixParameters::default());
        let session = spawn_session(test_engine(), context, mix_tx);

        let guide = MonoTrack::from_samples(vec![0.1; 4_800], 48_000);
        assert!(session.command(SessionCommand::LoadTrack(TrackKind::Guide, guide)).await);
        assert!(matches!(
            next_event(&mut events).await,
            MessageFromBackend::GuideAnalysisCompleted { hops: 38 }
        ));

        let mut config = Config::default();
        config.engine.sample_rate = 24_000;
        assert!(session.command(SessionCommand::ApplyConfig(Box::new(config))).await);
        match next_event(&mut events).await {
            MessageFromBackend::GuideAnalysisCompleted { hops } => assert_eq!(hops, 19),
            other => panic!("unexpected event {other:?}"),
        }
        session.shutdown().await;
    }

    #[tokio::test]
    async fn telemetry_export_and_shutdown() {
        let (context, _events) = test_context();
        let (mix_tx, _mix_rx) = watch::channel(MixParameters::default());
        let session = spawn_session(test_engine(), context, mix_tx);

        let (reply_tx, reply_rx) = oneshot::channel();
        assert!(session.command(SessionCommand::ExportTelemetry(reply_tx)).await);
        let json = reply_rx
            .await
            .expect("session replies")
            .expect("telemetry serializes");
        assert_eq!(json.trim(), "[]");

        session.shutdown().await;
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            while session.command(SessionCommand::Play).await {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(closed.is_ok(), "session kept accepting commands after shutdown");
    }
}

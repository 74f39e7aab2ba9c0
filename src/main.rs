//! Line-oriented host for the vocal-assist backend.
//!
//! Reads commands from stdin, forwards them over the bridge and logs what the
//! backend reports. Type `help` for the command list.

use std::{
    f32::consts::TAU,
    io::{BufRead, Write},
    thread,
};

use anyhow::Context;
use duetto_bridge::{
    BridgeChannels, MessageFromBackend, MessageToBackend,
    config::ManualMode,
    media::{TrackBuffer, TrackKind},
    notification::NotificationType,
};

const HELP: &str = "\
commands:
  start                 open the input device and start the engine
  devices               list input devices
  device <id>           select an input device
  demo                  load a synthetic instrument and guide
  play | pause | stop   control the transport
  seek <seconds>        move the playback cursor
  auto | on | off       manual gate mode
  mute | unmute         guide mute
  calibrate [seconds]   measure the vocal peak
  export                export telemetry as JSON
  config                print the configuration
  mix                   print the latest mix parameters
  quit                  shut down and exit";

const DEMO_RATE: u32 = 44_100;
const DEMO_SECONDS: f32 = 8.0;

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_colors(true)
        .with_threads(true)
        .with_local_timestamps()
        .init()
        .context("failed to build logger instance")?;

    let BridgeChannels {
        frontend_rx,
        frontend_tx,
        backend_rx,
        backend_tx,
        mix_tx,
        mix_rx,
    } = BridgeChannels::default();

    let backend = duetto_backend::run(backend_rx, backend_tx, mix_tx);
    let events = thread::Builder::new()
        .name("host-events".into())
        .spawn(move || log_backend_events(frontend_rx))
        .context("failed to spawn the event thread")?;

    println!("{HELP}");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        let message = match (command, words.next()) {
            ("help", _) => {
                println!("{HELP}");
                continue;
            }
            ("mix", _) => {
                println!("{:?}", *mix_rx.borrow());
                continue;
            }
            ("demo", _) => {
                for (kind, buffer) in demo_tracks() {
                    frontend_tx
                        .blocking_send(MessageToBackend::LoadTrack(kind, buffer))
                        .context("backend is gone")?;
                }
                continue;
            }
            ("quit" | "exit", _) => break,
            ("start", _) => MessageToBackend::StartEngineRequest,
            ("devices", _) => MessageToBackend::AudioDevicesListRequest,
            ("device", Some(id)) => MessageToBackend::SelectAudioDevice(id.to_string()),
            ("play", _) => MessageToBackend::Play,
            ("pause", _) => MessageToBackend::Pause,
            ("stop", _) => MessageToBackend::Stop,
            ("seek", Some(seconds)) => match seconds.parse() {
                Ok(seconds) => MessageToBackend::Seek(seconds),
                Err(err) => {
                    log::warn!("Invalid seek position {seconds}: {err}");
                    continue;
                }
            },
            ("auto", _) => MessageToBackend::SetManualMode(ManualMode::Auto),
            ("on", _) => MessageToBackend::SetManualMode(ManualMode::AlwaysOn),
            ("off", _) => MessageToBackend::SetManualMode(ManualMode::AlwaysOff),
            ("mute", _) => MessageToBackend::SetGuideMute(true),
            ("unmute", _) => MessageToBackend::SetGuideMute(false),
            ("calibrate", seconds) => MessageToBackend::StartCalibration {
                duration_seconds: seconds.and_then(|value| value.parse().ok()).unwrap_or(10.0),
            },
            ("export", _) => MessageToBackend::TelemetryExportRequest,
            ("config", _) => MessageToBackend::ConfigurationRequest,
            _ => {
                println!("unknown command `{line}`, try `help`");
                continue;
            }
        };

        frontend_tx
            .blocking_send(message)
            .context("backend is gone")?;
    }

    frontend_tx
        .blocking_send(MessageToBackend::Shutdown)
        .context("backend is gone")?;
    drop(frontend_tx);

    if backend.join().is_err() {
        anyhow::bail!("backend thread panicked");
    }
    if events.join().is_err() {
        anyhow::bail!("event thread panicked");
    }
    Ok(())
}

fn log_backend_events(mut rx: tokio::sync::mpsc::Receiver<MessageFromBackend>) {
    while let Some(message) = rx.blocking_recv() {
        match message {
            MessageFromBackend::MeterUpdate(meter) => log::info!(
                "in {:.3} out {:.3} | vad {:.2} conf {:.2} | gate {:.1} dB | pitch {:.1} Hz x{:.3} | dropped {}",
                meter.input_rms,
                meter.output_rms,
                meter.vad,
                meter.confidence,
                meter.gate_db,
                meter.pitch,
                meter.pitch_ratio,
                meter.dropped_blocks,
            ),
            MessageFromBackend::NotificationMessage(notification) => {
                match notification.notification_type {
                    NotificationType::Info => log::info!("{}", notification.message),
                    NotificationType::Warning => log::warn!("{}", notification.message),
                    NotificationType::Error => log::error!("{}", notification.message),
                }
            }
            MessageFromBackend::AudioDevicesListResponse(devices) => {
                let mut stdout = std::io::stdout().lock();
                for device in devices {
                    let marker = if device.selected { '*' } else { ' ' };
                    let _ = writeln!(stdout, "{marker} {} ({})", device.description, device.id);
                }
            }
            MessageFromBackend::TelemetryExportResponse(json) => {
                println!("{json}");
            }
            other => log::info!("{other:?}"),
        }
    }
}

/// A pad-like instrument chord and a sung-like guide line, both stereo.
fn demo_tracks() -> [(TrackKind, TrackBuffer); 2] {
    let frames = (DEMO_RATE as f32 * DEMO_SECONDS) as usize;
    let instrument: Vec<f32> = (0..frames)
        .map(|index| {
            let time = index as f32 / DEMO_RATE as f32;
            [110.0f32, 164.81, 220.0]
                .iter()
                .map(|frequency| (TAU * frequency * time).sin() * 0.1)
                .sum()
        })
        .collect();
    let guide: Vec<f32> = (0..frames)
        .map(|index| {
            let time = index as f32 / DEMO_RATE as f32;
            // one note per second, up and down a fifth
            let frequency = if (time as u32) % 2 == 0 { 220.0 } else { 329.63 };
            (TAU * frequency * time).sin() * 0.3
        })
        .collect();

    [
        (
            TrackKind::Instrument,
            TrackBuffer {
                sample_rate: DEMO_RATE,
                channels: vec![instrument.clone(), instrument],
            },
        ),
        (
            TrackKind::Guide,
            TrackBuffer {
                sample_rate: DEMO_RATE,
                channels: vec![guide.clone(), guide],
            },
        ),
    ]
}

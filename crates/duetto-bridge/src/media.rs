use serde::{Deserialize, Serialize};

/// Which of the two reference tracks a request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Backing track without vocals.
    Instrument,
    /// Guide vocal recording that gets ducked in and out.
    Guide,
}

/// A decoded reference track handed over by the host.
///
/// Samples are planar: one `Vec<f32>` per channel, all of equal length, with
/// amplitudes in `[-1, 1]`.
#[derive(Debug, Clone, Default)]
pub struct TrackBuffer {
    /// Native sample rate of the decoded track, in Hz.
    pub sample_rate: u32,
    /// Planar channel data.
    pub channels: Vec<Vec<f32>>,
}

impl TrackBuffer {
    /// Number of frames in the longest channel.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Parameters pushed to the playback graph after every processed block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixParameters {
    /// Linear gain of the directly monitored mic signal.
    pub monitor_gain: f32,
    /// Linear confidence-gate gain.
    pub gate_gain: f32,
    /// Pitch-shift ratio applied to the guide vocal, in `[0.5, 2.5]`.
    pub pitch_ratio: f32,
    /// Dry level of the guide vocal, in `[0, 1]`.
    pub guide_dry_level: f32,
    /// Reverb tail send level of the guide vocal, in `[0, 1]`.
    pub guide_tail_level: f32,
    /// Reverb tail decay time derived from the reverb strength.
    pub tail_decay_seconds: f32,
    /// Low-shelf gain of the guide timbre tilt, in dB.
    pub low_shelf_db: f32,
    /// High-shelf gain of the guide timbre tilt, in dB.
    pub high_shelf_db: f32,
}

impl Default for MixParameters {
    fn default() -> Self {
        Self {
            monitor_gain: 1.0,
            gate_gain: 1.0,
            pitch_ratio: 1.0,
            guide_dry_level: 0.0,
            guide_tail_level: 0.0,
            tail_decay_seconds: 0.0,
            low_shelf_db: 0.0,
            high_shelf_db: 0.0,
        }
    }
}

/// Decimated view of the engine state for meters in the host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterSnapshot {
    pub input_rms: f32,
    pub output_rms: f32,
    pub vad: f32,
    pub pitch: f32,
    pub confidence: f32,
    pub vocal_strength: f32,
    pub gate_db: f32,
    pub pitch_ratio: f32,
    /// Blocks dropped by the session queue since it started.
    pub dropped_blocks: u64,
}

/// A single telemetry record, captured once per processed block.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEntry {
    /// Milliseconds since the session started.
    pub timestamp_ms: f64,
    pub vad: f32,
    pub pitch: f32,
    pub confidence: f32,
    pub gain_db: f32,
}

/// Outcome of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CalibrationResult {
    pub noise_floor_db: f32,
    pub vocal_peak_db: f32,
    /// Whether any audio was observed during calibration.
    pub is_valid: bool,
}

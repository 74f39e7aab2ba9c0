//! Analysis framing of the live signal.
//!
//! Every incoming block is appended to two independent accumulators, a short
//! one feeding the voice-activity model and a long one feeding the pitch
//! model. Both are sized in native-rate samples; once an accumulator is full
//! its contents are decimated to the model rate and emitted as a single
//! [`AnalysisFrame`].

/// Which model an [`AnalysisFrame`] is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Vad,
    Pitch,
}

/// A full analysis window, already at the model sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFrame {
    pub kind: FrameKind,
    pub samples: Vec<f32>,
}

/// Block-mean decimation of `source` into `target`.
///
/// Output sample `i` is the mean of `source[floor(i*S/T)..floor((i+1)*S/T)]`,
/// where `S` and `T` are the source and target lengths. When a range is empty
/// (upsampling), the sample at its start is used instead. Equal lengths copy.
pub fn decimate_into(source: &[f32], target: &mut [f32]) {
    let source_len = source.len();
    let target_len = target.len();
    if target_len == 0 {
        return;
    }
    if source_len == 0 {
        target.fill(0.0);
        return;
    }
    if source_len == target_len {
        target.copy_from_slice(source);
        return;
    }

    for (i, output) in target.iter_mut().enumerate() {
        let start = (i * source_len) / target_len;
        let end = ((i + 1) * source_len) / target_len;
        *output = if end > start {
            source[start..end].iter().sum::<f32>() / (end - start) as f32
        } else {
            source[start.min(source_len - 1)]
        };
    }
}

/// Allocating variant of [`decimate_into`].
pub fn decimate(source: &[f32], target_len: usize) -> Vec<f32> {
    let mut target = vec![0.0f32; target_len];
    decimate_into(source, &mut target);
    target
}

/// Converts a length expressed at `from_rate` into the equivalent length at
/// `to_rate`, rounding to the nearest sample.
pub fn samples_at_rate(len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == to_rate || from_rate == 0 {
        return len;
    }
    ((len as u64 * to_rate as u64 + from_rate as u64 / 2) / from_rate as u64) as usize
}

struct WindowAccumulator {
    kind: FrameKind,
    buffer: Vec<f32>,
    offset: usize,
    model_len: usize,
}

impl WindowAccumulator {
    fn new(kind: FrameKind, native_len: usize, model_len: usize) -> Self {
        Self {
            kind,
            buffer: vec![0.0; native_len.max(1)],
            offset: 0,
            model_len: model_len.max(1),
        }
    }

    #[inline]
    fn push(&mut self, sample: f32) -> Option<AnalysisFrame> {
        self.buffer[self.offset] = sample;
        self.offset += 1;
        if self.offset < self.buffer.len() {
            return None;
        }

        self.offset = 0;
        Some(AnalysisFrame {
            kind: self.kind,
            samples: decimate(&self.buffer, self.model_len),
        })
    }
}

/// Splits the live signal into VAD and pitch analysis frames.
pub struct FrameAccumulator {
    vad: WindowAccumulator,
    pitch: WindowAccumulator,
}

impl FrameAccumulator {
    /// Creates an accumulator for blocks arriving at `native_rate`, producing
    /// frames of `vad_model_len` and `pitch_model_len` samples at
    /// `model_rate`.
    pub fn new(
        native_rate: u32,
        model_rate: u32,
        vad_model_len: usize,
        pitch_model_len: usize,
    ) -> Self {
        let vad_native = samples_at_rate(vad_model_len, model_rate, native_rate);
        let pitch_native = samples_at_rate(pitch_model_len, model_rate, native_rate);
        Self {
            vad: WindowAccumulator::new(FrameKind::Vad, vad_native, vad_model_len),
            pitch: WindowAccumulator::new(FrameKind::Pitch, pitch_native, pitch_model_len),
        }
    }

    /// Appends a block and collects every frame completed by it into
    /// `frames`, in completion order.
    pub fn push(&mut self, block: &[f32], frames: &mut Vec<AnalysisFrame>) {
        for &sample in block {
            if let Some(frame) = self.vad.push(sample) {
                frames.push(frame);
            }
            if let Some(frame) = self.pitch.push(sample) {
                frames.push(frame);
            }
        }
    }

    /// Drops any partially accumulated samples.
    pub fn reset(&mut self) {
        self.vad.offset = 0;
        self.pitch.offset = 0;
    }

    /// Native-rate lengths of the VAD and pitch windows.
    pub fn window_lengths(&self) -> (usize, usize) {
        (self.vad.buffer.len(), self.pitch.buffer.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimation_averages_contiguous_ranges() {
        let source = [1.0f32, 3.0, 5.0, 7.0, 9.0, 11.0];
        assert_eq!(decimate(&source, 3), vec![2.0, 6.0, 10.0]);
    }

    #[test]
    fn uneven_decimation_uses_floor_boundaries() {
        // S=5, T=2: ranges [0,2) and [2,5)
        let source = [0.0f32, 2.0, 3.0, 3.0, 3.0];
        assert_eq!(decimate(&source, 2), vec![1.0, 3.0]);
    }

    #[test]
    fn equal_lengths_are_copied() {
        let source = [0.1f32, -0.2, 0.3];
        assert_eq!(decimate(&source, 3), source.to_vec());
    }

    #[test]
    fn upsampling_repeats_source_samples() {
        assert_eq!(decimate(&[1.0, 2.0], 4), vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn frames_are_only_emitted_when_full() {
        let mut accumulator = FrameAccumulator::new(48_000, 16_000, 160, 1024);
        assert_eq!(accumulator.window_lengths(), (480, 3072));

        let block = vec![0.5f32; 128];
        let mut frames = Vec::new();
        for _ in 0..3 {
            accumulator.push(&block, &mut frames);
        }
        assert!(frames.is_empty(), "384 samples must not complete a 480 window");

        accumulator.push(&block, &mut frames);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Vad);
        assert_eq!(frames[0].samples.len(), 160);
        assert!(frames[0].samples.iter().all(|&sample| sample == 0.5));
    }

    #[test]
    fn pitch_frame_arrives_after_its_window() {
        let mut accumulator = FrameAccumulator::new(48_000, 16_000, 160, 1024);
        let block = vec![0.0f32; 128];
        let mut frames = Vec::new();
        for _ in 0..24 {
            accumulator.push(&block, &mut frames);
        }

        let pitch_frames: Vec<_> = frames
            .iter()
            .filter(|frame| frame.kind == FrameKind::Pitch)
            .collect();
        let vad_frames = frames.iter().filter(|frame| frame.kind == FrameKind::Vad).count();
        assert_eq!(pitch_frames.len(), 1);
        assert_eq!(pitch_frames[0].samples.len(), 1024);
        assert_eq!(vad_frames, 3072 / 480);
    }

    #[test]
    fn native_model_rate_skips_resampling() {
        let mut accumulator = FrameAccumulator::new(16_000, 16_000, 4, 8);
        let mut frames = Vec::new();
        accumulator.push(&[1.0, 2.0, 3.0, 4.0], &mut frames);
        assert_eq!(frames[0].samples, vec![1.0, 2.0, 3.0, 4.0]);
    }
}

/// Mixes interleaved multichannel samples down to mono by averaging every
/// frame's channels.
///
/// `interleaved` holds frames in the form `[C0, C1, .., Cn, C0, ..]`. Mono
/// frames are written to the front of `mono`, which must hold at least
/// `interleaved.len() / channels` samples.
///
/// # Returns
/// Returns the number of mono frames written.
pub fn mix_interleaved_to_mono<T>(mono: &mut [T], interleaved: &[T], channels: usize) -> usize
where
    T: Copy
        + num_traits::identities::Zero
        + num_traits::FromPrimitive
        + std::ops::Add<Output = T>
        + std::ops::Mul<Output = T>,
{
    if channels <= 1 {
        let frames = interleaved.len().min(mono.len());
        mono[..frames].copy_from_slice(&interleaved[..frames]);
        return frames;
    }

    let frames = (interleaved.len() / channels).min(mono.len());
    let scale = T::from_f32(1.0 / channels as f32).unwrap_or_else(T::zero);
    for (frame, output) in interleaved.chunks_exact(channels).zip(mono.iter_mut()) {
        let sum = frame.iter().fold(T::zero(), |acc, &sample| acc + sample);
        *output = sum * scale;
    }
    frames
}

/// Mixes planar channel data (one slice per channel) down to a single mono
/// buffer. Channels shorter than the longest one are treated as silent past
/// their end.
pub fn mix_planar_to_mono(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    if channels.is_empty() || frames == 0 {
        return Vec::new();
    }

    let scale = 1.0 / channels.len() as f32;
    let mut mono = vec![0.0f32; frames];
    for channel in channels {
        for (output, &sample) in mono.iter_mut().zip(channel.iter()) {
            *output += sample;
        }
    }
    mono.iter_mut().for_each(|sample| *sample *= scale);
    mono
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_frames_are_averaged() {
        let interleaved = [1.0f32, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mut mono = [9.0f32; 3];
        let frames = mix_interleaved_to_mono(&mut mono, &interleaved, 2);
        assert_eq!(frames, 3);
        assert_eq!(mono, [0.5, 0.5, 0.0]);
    }

    #[test]
    fn mono_input_is_copied() {
        let interleaved = [0.25f32, -0.25];
        let mut mono = [0.0f32; 2];
        assert_eq!(mix_interleaved_to_mono(&mut mono, &interleaved, 1), 2);
        assert_eq!(mono, interleaved);
    }

    #[test]
    fn planar_mix_pads_short_channels() {
        let mono = mix_planar_to_mono(&[vec![1.0, 1.0, 1.0], vec![1.0]]);
        assert_eq!(mono, vec![1.0, 0.5, 0.5]);
        assert!(mix_planar_to_mono(&[]).is_empty());
    }
}

//! Audio utilities for capturing, mixing, resampling and framing the live
//! microphone signal.
//!
//! This crate wraps low-level audio building blocks into a small set of
//! helpers oriented toward real-time mono processing:
//! - Enumerating input devices and building fixed-buffer input streams with
//!   `cpal`.
//! - Mixing interleaved or planar audio down to mono.
//! - Resampling mono streams and whole tracks with FFT-based resamplers.
//! - Slicing the live signal into model-rate analysis frames.
//!
//! # Real-time constraints
//! Audio callbacks run on a real-time thread. Avoid allocations, locks, and
//! blocking I/O inside callbacks whenever possible.

pub mod device;
pub mod frames;
pub mod mixer;
pub mod resampler;

/// Computes the greatest common divisor (GCD) of two unsigned integers.
pub(crate) fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let temp = a % b;
        a = b;
        b = temp;
    }
    a.max(1)
}

/// Rounds `base` to the nearest multiple of `denominator`, rounding ties
/// upward.
pub(crate) fn find_nearest_to(base: u32, denominator: u32) -> u32 {
    let remainder = base % denominator;
    if remainder * 2 < denominator {
        base - remainder
    } else {
        base - remainder + denominator
    }
}

/// Root-mean-square level of a block of samples. Empty blocks are silent.
pub fn block_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcd_of_common_rates() {
        assert_eq!(gcd(48_000, 16_000), 16_000);
        assert_eq!(gcd(44_100, 48_000), 300);
    }

    #[test]
    fn nearest_multiple_rounds_ties_up() {
        assert_eq!(find_nearest_to(128, 3), 129);
        assert_eq!(find_nearest_to(130, 4), 132);
        assert_eq!(find_nearest_to(129, 4), 128);
    }

    #[test]
    fn rms_of_constant_block() {
        assert_eq!(block_rms(&[]), 0.0);
        assert!((block_rms(&[0.5; 64]) - 0.5).abs() < 1e-6);
    }
}

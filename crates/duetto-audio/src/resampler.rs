use rubato::{FftFixedInOut, Resampler, ResamplerConstructionError};

/// Internal FFT chunk size used when conforming whole tracks.
const CONFORM_BLOCK_SIZE: u32 = 1024;

/// Errors that can occur during audio resampling.
#[derive(Debug, thiserror::Error)]
pub enum ResamplerError {
    /// The resampler could not be constructed for the requested rates.
    #[error("failed to construct resampler: {0}")]
    Construction(#[from] ResamplerConstructionError),
    /// The underlying resampling engine failed while processing samples.
    #[error("failed to resample input samples: {0}")]
    ResampleError(#[from] rubato::ResampleError),
}

/// Real-time audio stream resampler trait.
///
/// Implementations consume mono input samples and deliver resampled output
/// through a user-provided callback. They must not allocate while processing
/// steady-size input and must be usable from the audio thread.
pub trait AudioResampler<T: rubato::Sample>: Send {
    /// Process an input audio buffer and emit resampled output via a callback.
    ///
    /// The callback is invoked zero or more times with contiguous slices of
    /// resampled output data.
    ///
    /// # Returns
    /// Returns the total number of output samples written during this call.
    fn process_callback(
        &mut self,
        input: &[T],
        callback: &mut dyn FnMut(&[T]),
    ) -> Result<usize, ResamplerError>;
}

/// FFT-based streaming resampler for arbitrary input block sizes.
///
/// Incoming samples are queued and fed to the FFT engine whenever a full
/// chunk is available; output is delivered as soon as it is produced.
pub struct StreamingResampler<T: rubato::Sample> {
    resampler: FftFixedInOut<T>,
    frames_queue: std::collections::VecDeque<T>,

    input_buffer: Vec<T>,
    output_buffer: Vec<T>,
}

impl<T: rubato::Sample> StreamingResampler<T> {
    /// Creates a new FFT-based streaming resampler for mono audio.
    ///
    /// `block_size` controls the internal FFT chunk size and therefore the
    /// latency, but any number of input samples may be passed per call.
    ///
    /// This function allocates and should be called during initialization,
    /// not from a real-time audio thread.
    pub fn new(
        original_rate: u32,
        target_rate: u32,
        block_size: u32,
    ) -> Result<Self, ResamplerConstructionError> {
        let resampler = FftFixedInOut::new(
            original_rate as usize,
            target_rate as usize,
            block_size as usize,
            1, // we're using mono
        )?;

        let raw_input_buffer = resampler.input_buffer_allocate(true);
        let raw_output_buffer = resampler.output_buffer_allocate(true);
        let queue_capacity = resampler.input_frames_max() * 4;

        Ok(Self {
            frames_queue: std::collections::VecDeque::with_capacity(queue_capacity),
            input_buffer: raw_input_buffer[0].clone(),
            output_buffer: raw_output_buffer[0].clone(),
            resampler,
        })
    }

    /// Number of output samples the FFT engine delays its output by.
    pub fn output_delay(&self) -> usize {
        self.resampler.output_delay()
    }

    /// Number of input samples consumed by the next FFT chunk.
    pub fn input_frames_next(&self) -> usize {
        self.resampler.input_frames_next()
    }
}

impl<T: rubato::Sample> AudioResampler<T> for StreamingResampler<T> {
    fn process_callback(
        &mut self,
        input: &[T],
        callback: &mut dyn FnMut(&[T]),
    ) -> Result<usize, ResamplerError> {
        let mut total_written = 0usize;
        self.frames_queue.extend(input);

        loop {
            let wanted_len = self.resampler.input_frames_next();
            if self.frames_queue.len() < wanted_len {
                break;
            }

            if self.input_buffer.len() != wanted_len {
                self.input_buffer.resize(wanted_len, T::zero());
            }
            for (slot, value) in self
                .input_buffer
                .iter_mut()
                .zip(self.frames_queue.drain(..wanted_len))
            {
                *slot = value;
            }

            let input_buffer = &[&self.input_buffer];
            let output_buffer = &mut [&mut self.output_buffer];
            let (_, output_written) =
                self.resampler
                    .process_into_buffer(input_buffer, output_buffer, None)?;

            // don't call callback if nothing was written
            if output_written > 0 {
                callback(&self.output_buffer[..output_written]);
                total_written += output_written;
            }
        }

        Ok(total_written)
    }
}

/// Converts a whole mono track from `original_rate` to `target_rate`.
///
/// The output is aligned with the input (the FFT delay is removed) and has
/// exactly `ceil(len * target_rate / original_rate)` samples. Equal rates
/// return a plain copy.
///
/// Allocates proportionally to the track length; never call this from the
/// audio thread.
pub fn conform_to_rate(
    samples: &[f32],
    original_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, ResamplerError> {
    if original_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let expected_len =
        (samples.len() as u64 * target_rate as u64).div_ceil(original_rate as u64) as usize;
    let mut resampler =
        StreamingResampler::<f32>::new(original_rate, target_rate, CONFORM_BLOCK_SIZE)?;
    let delay = resampler.output_delay();

    let mut output = Vec::with_capacity(expected_len + delay + CONFORM_BLOCK_SIZE as usize * 2);
    resampler.process_callback(samples, &mut |chunk| output.extend_from_slice(chunk))?;

    // push silence until the delayed tail of the track has been flushed out
    let padding = vec![0.0f32; resampler.input_frames_next()];
    while output.len() < expected_len + delay {
        resampler.process_callback(&padding, &mut |chunk| output.extend_from_slice(chunk))?;
    }

    output.drain(..delay);
    output.truncate(expected_len);
    Ok(output)
}

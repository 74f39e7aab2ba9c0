/// Transport state of the reference tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Sample cursor shared by the instrument and the guide.
///
/// The cursor counts engine-rate samples. With looping enabled it always
/// stays within `[0, length)`, where `length` is the longer of the two tracks.
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    state: TransportState,
    cursor: u64,
    sample_rate: u32,
    looping: bool,
    instrument_len: u64,
    guide_len: u64,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32, looping: bool) -> Self {
        Self {
            state: TransportState::Stopped,
            cursor: 0,
            sample_rate,
            looping,
            instrument_len: 0,
            guide_len: 0,
        }
    }

    /// Switches the engine rate, rescaling the cursor so it keeps pointing
    /// at the same position in seconds. Track lengths must be refreshed by
    /// the caller.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if self.sample_rate > 0 && sample_rate != self.sample_rate {
            let scaled = u128::from(self.cursor) * u128::from(sample_rate)
                / u128::from(self.sample_rate);
            self.cursor = u64::try_from(scaled).unwrap_or(u64::MAX);
        }
        self.sample_rate = sample_rate;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        self.normalize();
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Updates the track lengths, in engine-rate samples.
    pub fn set_track_lengths(&mut self, instrument_len: usize, guide_len: usize) {
        self.instrument_len = instrument_len as u64;
        self.guide_len = guide_len as u64;
        self.normalize();
    }

    /// Length of the shared timeline: the longer of both tracks.
    pub fn length(&self) -> u64 {
        self.instrument_len.max(self.guide_len)
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn position_seconds(&self) -> f64 {
        self.cursor as f64 / f64::from(self.sample_rate.max(1))
    }

    /// Resumes from the stored offset.
    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    /// Stops advancing; the current position becomes the resume offset.
    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    /// Stops and rewinds to the beginning.
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.cursor = 0;
    }

    /// Moves the cursor to `seconds`. Negative or non-finite positions seek to
    /// the start.
    pub fn seek(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        self.cursor = (seconds * f64::from(self.sample_rate)).floor() as u64;
        self.normalize();
    }

    /// Advances by one block while playing and returns the cursor the block
    /// started at.
    pub fn advance(&mut self, block_len: usize) -> u64 {
        let start = self.cursor;
        if self.state != TransportState::Playing {
            return start;
        }

        let length = self.length();
        if length == 0 {
            return start;
        }

        let next = self.cursor + block_len as u64;
        if self.looping {
            self.cursor = next % length;
        } else if next >= length {
            log::debug!("Playback reached the end of the timeline");
            self.stop();
        } else {
            self.cursor = next;
        }
        start
    }

    /// Offset into a track of `track_len` samples for timeline position
    /// `position`. Looping wraps by the track's own length; otherwise
    /// positions past the end yield `None`.
    pub fn offset_in(&self, position: u64, track_len: usize) -> Option<usize> {
        let track_len = track_len as u64;
        if track_len == 0 {
            return None;
        }
        if self.looping {
            Some((position % track_len) as usize)
        } else if position < track_len {
            Some(position as usize)
        } else {
            None
        }
    }

    fn normalize(&mut self) {
        let length = self.length();
        if length == 0 {
            return;
        }
        if self.looping {
            self.cursor %= length;
        } else {
            self.cursor = self.cursor.min(length - 1);
        }
    }
}

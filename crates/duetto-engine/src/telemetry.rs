use std::collections::VecDeque;

use duetto_bridge::media::TelemetryEntry;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to serialize telemetry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Bounded, append-only ring of per-block telemetry. The oldest entries are
/// dropped once the capacity is reached.
#[derive(Debug, Clone)]
pub struct TelemetryLog {
    entries: VecDeque<TelemetryEntry>,
    capacity: usize,
}

impl TelemetryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Changes the capacity, dropping the oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn record(&mut self, entry: TelemetryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TelemetryEntry> {
        self.entries.iter()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Serializes the ring, oldest first, as a pretty JSON array.
    pub fn export_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp_ms: f64) -> TelemetryEntry {
        TelemetryEntry {
            timestamp_ms,
            vad: 0.5,
            pitch: 0.25,
            confidence: 0.75,
            gain_db: -18.0,
        }
    }

    #[test]
    fn drops_oldest_beyond_capacity() {
        let mut log = TelemetryLog::new(3);
        for timestamp in 0..5 {
            log.record(entry(timestamp as f64));
        }
        let timestamps: Vec<f64> = log.entries().map(|entry| entry.timestamp_ms).collect();
        assert_eq!(timestamps, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn exports_camel_case_json() {
        let mut log = TelemetryLog::new(8);
        log.record(entry(1.5));

        let json = log.export_json().expect("telemetry should serialize");
        let parsed: serde_json::Value =
            serde_json::from_str(&json).expect("export should be valid JSON");
        assert_eq!(parsed[0]["timestampMs"], 1.5);
        assert_eq!(parsed[0]["gainDb"], -18.0);
    }

    #[test]
    fn shrinking_capacity_keeps_newest() {
        let mut log = TelemetryLog::new(4);
        for timestamp in 0..4 {
            log.record(entry(timestamp as f64));
        }
        log.set_capacity(2);
        assert_eq!(log.entries().next().map(|entry| entry.timestamp_ms), Some(2.0));
    }
}

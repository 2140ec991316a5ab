use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::control::metric::{GestureLabel, GestureSample};

pub const DEFAULT_HISTORY_CAPACITY: usize = 5_000;

/// One timestamped gesture sample as written to session reports.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub volume_percent: u8,
    pub distance_px: f64,
    pub gesture: GestureLabel,
    pub accuracy_percent: f64,
    pub response_time_ms: f64,
}

impl TelemetryRecord {
    pub fn new(timestamp: DateTime<Utc>, sample: &GestureSample) -> Self {
        Self {
            timestamp,
            volume_percent: sample.volume_percent,
            distance_px: sample.distance_px,
            gesture: sample.gesture,
            accuracy_percent: sample.accuracy_percent,
            response_time_ms: sample.response_time_ms,
        }
    }
}

/// Bounded FIFO history of gesture samples.
///
/// Appending at capacity evicts the oldest record first.
#[derive(Debug)]
pub struct TelemetryBuffer {
    records: VecDeque<TelemetryRecord>,
    capacity: usize,
}

impl Default for TelemetryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl TelemetryBuffer {
    /// A zero capacity is bumped to one so that the newest record is always kept.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Append a record, returning the evicted head if the buffer was full.
    pub fn append(&mut self, record: TelemetryRecord) -> Option<TelemetryRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    pub fn snapshot(&self) -> Vec<TelemetryRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// Take every record out, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<TelemetryRecord> {
        self.records.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.back().map(|record| record.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn record_at(offset_ms: i64) -> TelemetryRecord {
        let base = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        let sample = GestureSample {
            distance_px: 100.0 + offset_ms as f64,
            volume_percent: 26,
            gesture: GestureLabel::Open,
            accuracy_percent: 81.35,
            response_time_ms: 33.3,
        };
        TelemetryRecord::new(base + Duration::milliseconds(offset_ms), &sample)
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = TelemetryBuffer::new(3);
        for i in 0..4 {
            buffer.append(record_at(i * 10));
        }
        assert_eq!(buffer.len(), 3);
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot[0].timestamp, record_at(10).timestamp);
        assert_eq!(snapshot[2].timestamp, record_at(30).timestamp);
    }

    #[test]
    fn append_reports_evicted_head() {
        let mut buffer = TelemetryBuffer::new(1);
        assert!(buffer.append(record_at(0)).is_none());
        let evicted = buffer.append(record_at(5)).expect("head evicted");
        assert_eq!(evicted.timestamp, record_at(0).timestamp);
        assert_eq!(buffer.last_timestamp(), Some(record_at(5).timestamp));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut buffer = TelemetryBuffer::new(4);
        buffer.append(record_at(0));
        let snapshot = buffer.snapshot();
        buffer.append(record_at(1));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn clear_and_drain_empty_the_buffer() {
        let mut buffer = TelemetryBuffer::new(4);
        buffer.append(record_at(0));
        buffer.append(record_at(1));
        assert_eq!(buffer.clear(), 2);
        assert!(buffer.snapshot().is_empty());

        buffer.append(record_at(2));
        let drained = buffer.drain();
        assert_eq!(drained.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn zero_capacity_keeps_latest_record() {
        let mut buffer = TelemetryBuffer::new(0);
        buffer.append(record_at(0));
        buffer.append(record_at(1));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }
}

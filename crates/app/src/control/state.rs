//! Session state shared between the pipeline thread and HTTP handlers.
//!
//! Live metrics and the telemetry history sit behind a single mutex so a
//! sample is published to both in one critical section, and export can take
//! and clear the history without racing an append. The running flag is a
//! lone atomic read once per pipeline iteration.

use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::control::{
    history::{TelemetryBuffer, TelemetryRecord},
    metric::GestureSample,
};

/// Latest derived metrics as seen by polling clients.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LiveState {
    pub sample: GestureSample,
    pub updated_at: Option<DateTime<Utc>>,
    pub samples_total: u64,
}

#[derive(Debug)]
struct SessionInner {
    live: LiveState,
    history: TelemetryBuffer,
}

#[derive(Debug)]
pub struct SessionState {
    running: AtomicBool,
    inner: Mutex<SessionInner>,
}

impl SessionState {
    pub fn new(history_capacity: usize, running: bool) -> Self {
        Self {
            running: AtomicBool::new(running),
            inner: Mutex::new(SessionInner {
                live: LiveState::default(),
                history: TelemetryBuffer::new(history_capacity),
            }),
        }
    }

    // Critical sections never leave the inner state half-written, so a
    // poisoned lock still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("session state lock poisoned; continuing with inner value");
            poisoned.into_inner()
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Set the running flag and return the resulting value.
    pub fn set_running(&self, running: bool) -> bool {
        self.running.store(running, Ordering::Release);
        running
    }

    pub fn live(&self) -> LiveState {
        self.lock().live
    }

    /// Publish a sample to live state and append it to the history.
    ///
    /// Timestamps never go backwards in the history even if the wall clock
    /// does; a late `at` is raised to the newest buffered timestamp.
    pub fn record(&self, sample: GestureSample, at: DateTime<Utc>) -> TelemetryRecord {
        let mut inner = self.lock();
        let timestamp = match inner.history.last_timestamp() {
            Some(last) if last > at => last,
            _ => at,
        };
        inner.live = LiveState {
            sample,
            updated_at: Some(timestamp),
            samples_total: inner.live.samples_total.saturating_add(1),
        };
        let record = TelemetryRecord::new(timestamp, &sample);
        if inner.history.append(record.clone()).is_some() {
            metrics::counter!("gesture_history_evictions_total").increment(1);
        }
        metrics::gauge!("gesture_history_records").set(inner.history.len() as f64);
        record
    }

    pub fn snapshot_history(&self) -> Vec<TelemetryRecord> {
        self.lock().history.snapshot()
    }

    /// Take the whole history and leave it empty, atomically.
    pub fn drain_history(&self) -> Vec<TelemetryRecord> {
        let mut inner = self.lock();
        let drained = inner.history.drain();
        metrics::gauge!("gesture_history_records").set(inner.history.len() as f64);
        drained
    }

    pub fn clear_history(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.history.clear();
        metrics::gauge!("gesture_history_records").set(inner.history.len() as f64);
        removed
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    pub fn history_capacity(&self) -> usize {
        self.lock().history.capacity()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use chrono::Duration;

    use super::*;
    use crate::control::metric::{GestureLabel, GestureMetric};

    fn sample(distance: f64) -> GestureSample {
        GestureMetric::default().from_distance(distance, 0.0)
    }

    #[test]
    fn starts_with_closed_zero_metrics() {
        let session = SessionState::new(10, true);
        let live = session.live();
        assert_eq!(live.sample.volume_percent, 0);
        assert_eq!(live.sample.distance_px, 0.0);
        assert_eq!(live.sample.gesture, GestureLabel::Closed);
        assert_eq!(live.updated_at, None);
        assert!(session.is_running());
    }

    #[test]
    fn record_updates_live_state_and_history_together() {
        let session = SessionState::new(10, true);
        let now = Utc::now();
        session.record(sample(165.0), now);
        let live = session.live();
        assert_eq!(live.sample.volume_percent, 50);
        assert_eq!(live.samples_total, 1);
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.snapshot_history()[0].timestamp, now);
    }

    #[test]
    fn history_timestamps_never_decrease() {
        let session = SessionState::new(10, true);
        let now = Utc::now();
        session.record(sample(100.0), now);
        let late = session.record(sample(120.0), now - Duration::seconds(5));
        assert_eq!(late.timestamp, now);
    }

    #[test]
    fn toggle_is_idempotent() {
        let session = SessionState::new(10, true);
        assert!(!session.set_running(false));
        assert!(!session.set_running(false));
        assert!(!session.is_running());
        assert!(session.set_running(true));
    }

    #[test]
    fn drain_then_snapshot_is_empty() {
        let session = SessionState::new(10, true);
        session.record(sample(100.0), Utc::now());
        session.record(sample(200.0), Utc::now());
        assert_eq!(session.drain_history().len(), 2);
        assert_eq!(session.history_len(), 0);
        assert!(session.snapshot_history().is_empty());
        // Live metrics survive an export.
        assert_eq!(session.live().samples_total, 2);
    }

    fn rendered_gauge(rendered: &str, name: &str) -> Option<f64> {
        rendered
            .lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(' '))
            .and_then(|value| value.trim().parse().ok())
    }

    #[test]
    fn history_gauge_tracks_buffer_after_clear_and_drain() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            let session = SessionState::new(10, true);
            session.record(sample(100.0), Utc::now());
            session.record(sample(120.0), Utc::now());
            assert_eq!(
                rendered_gauge(&handle.render(), "gesture_history_records"),
                Some(2.0)
            );

            session.clear_history();
            assert_eq!(
                rendered_gauge(&handle.render(), "gesture_history_records"),
                Some(0.0)
            );

            session.record(sample(140.0), Utc::now());
            session.drain_history();
            session.record(sample(160.0), Utc::now());
            assert_eq!(
                rendered_gauge(&handle.render(), "gesture_history_records"),
                Some(session.history_len() as f64)
            );
        });
    }

    #[test]
    fn concurrent_export_loses_and_duplicates_nothing() {
        let session = Arc::new(SessionState::new(100_000, true));
        let writer = {
            let session = session.clone();
            thread::spawn(move || {
                for i in 0..2_000 {
                    session.record(sample(i as f64), Utc::now());
                }
            })
        };
        let mut exported = 0;
        for _ in 0..50 {
            exported += session.drain_history().len();
            thread::yield_now();
        }
        writer.join().unwrap();
        exported += session.drain_history().len();
        assert_eq!(exported, 2_000);
    }
}

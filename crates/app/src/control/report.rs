//! CSV session reports.

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::control::{history::TelemetryRecord, state::SessionState};

pub const CSV_HEADER: [&str; 6] = [
    "timestamp_utc",
    "volume_percent",
    "finger_distance_px",
    "gesture",
    "accuracy_percent",
    "response_time_ms",
];

/// A drained session ready to be sent as an attachment.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub filename: String,
    pub csv: Vec<u8>,
    pub rows: usize,
}

/// `gesture_session_<YYYYMMDDThhmmssZ>.csv`
pub fn report_filename(at: DateTime<Utc>) -> String {
    format!("gesture_session_{}.csv", at.format("%Y%m%dT%H%M%SZ"))
}

/// Serialize records in append order under a single header row.
pub fn export_csv(records: &[TelemetryRecord]) -> Vec<u8> {
    let mut out = String::with_capacity(64 + records.len() * 72);
    let _ = writeln!(out, "{}", CSV_HEADER.join(","));
    for record in records {
        let _ = writeln!(
            out,
            "{},{},{:.2},{},{:.2},{:.2}",
            record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            record.volume_percent,
            record.distance_px,
            escape_csv(record.gesture.as_str()),
            record.accuracy_percent,
            record.response_time_ms,
        );
    }
    out.into_bytes()
}

/// Drain the session history and serialize it once the lock is released.
pub fn export_session(session: &SessionState, at: DateTime<Utc>) -> SessionReport {
    let records = session.drain_history();
    let csv = export_csv(&records);
    SessionReport {
        filename: report_filename(at),
        csv,
        rows: records.len(),
    }
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

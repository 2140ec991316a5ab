use std::sync::{Arc, Mutex};

use actix_web::web::Bytes;
use serde::{Deserialize, Serialize};

use crate::control::{metric::GestureLabel, state::LiveState};

/// One encoded preview frame, shared by every stream consumer.
#[derive(Clone, Debug)]
pub struct FramePacket {
    pub jpeg: Bytes,
    pub frame_number: u64,
    pub timestamp_ms: i64,
    pub fps: f32,
    pub placeholder: bool,
}

/// Latest-frame slot written by the pipeline and polled by HTTP streams.
pub type SharedFrame = Arc<Mutex<Option<FramePacket>>>;

pub fn shared_frame() -> SharedFrame {
    Arc::new(Mutex::new(None))
}

/// Clone the latest packet out of the slot, tolerating a poisoned lock.
pub fn latest_frame(shared: &SharedFrame) -> Option<FramePacket> {
    match shared.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn publish_frame(shared: &SharedFrame, packet: FramePacket) {
    match shared.lock() {
        Ok(mut guard) => *guard = Some(packet),
        Err(poisoned) => *poisoned.into_inner() = Some(packet),
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricsResponse {
    pub volume: u8,
    pub distance: i64,
    pub gesture: GestureLabel,
    pub accuracy: f64,
    pub response_time: f64,
}

impl From<&LiveState> for MetricsResponse {
    fn from(live: &LiveState) -> Self {
        let sample = &live.sample;
        Self {
            volume: sample.volume_percent,
            distance: sample.distance_px as i64,
            gesture: sample.gesture,
            accuracy: sample.accuracy_percent,
            response_time: sample.response_time_ms,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    #[serde(default = "default_running")]
    pub running: bool,
}

fn default_running() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToggleResponse {
    pub running: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub running: bool,
    pub buffered: usize,
    pub capacity: usize,
    pub frame_number: Option<u64>,
    pub fps: Option<f32>,
}

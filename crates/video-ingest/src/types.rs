use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Raw BGR8 frame captured from a video source.
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// All-black frame stamped with the current wall clock.
    pub fn blank(width: i32, height: i32) -> Self {
        let len = (width.max(0) as usize) * (height.max(0) as usize) * 3;
        Self {
            data: vec![0; len],
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    pub fn expected_len(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize) * self.format.bytes_per_pixel()
    }

    /// Validate dimensions against the payload before any pixel access.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(CaptureError::Malformed {
                expected: 0,
                actual: self.data.len(),
            });
        }
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(CaptureError::Malformed {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Flip the frame around its vertical axis so the preview behaves like a mirror.
    pub fn mirror_horizontal(&mut self) {
        let bpp = self.format.bytes_per_pixel();
        let row_len = self.width.max(0) as usize * bpp;
        if row_len == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(row_len) {
            let pixels = row_len / bpp;
            for left in 0..pixels / 2 {
                let right = pixels - 1 - left;
                for channel in 0..bpp {
                    row.swap(left * bpp + channel, right * bpp + channel);
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("no frame arrived within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("capture source disconnected")]
    Disconnected,
    #[error("malformed frame: expected {expected} bytes, got {actual}")]
    Malformed { expected: usize, actual: usize },
    #[error(transparent)]
    Other(#[from] Error),
}

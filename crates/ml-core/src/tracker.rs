use thiserror::Error;

use crate::landmarks::HandObservation;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("expected {expected} hand landmarks, got {actual}")]
    LandmarkCount { expected: usize, actual: usize },
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),
    #[error(transparent)]
    Inference(#[from] anyhow::Error),
}

/// Borrowed BGR8 image handed to a tracker.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    pub bgr: &'a [u8],
    pub width: i32,
    pub height: i32,
}

impl FrameView<'_> {
    pub fn check(&self) -> Result<(), TrackerError> {
        let expected = (self.width.max(0) as usize) * (self.height.max(0) as usize) * 3;
        if self.width <= 0 || self.height <= 0 || self.bgr.len() != expected {
            return Err(TrackerError::UnsupportedFrame(format!(
                "{}x{} frame with {} bytes",
                self.width,
                self.height,
                self.bgr.len()
            )));
        }
        Ok(())
    }
}

/// Hand landmark inference capability.
///
/// Implementations return zero or more hands in pixel coordinates of the
/// supplied frame, most confident first.
pub trait HandTracker: Send {
    fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<HandObservation>, TrackerError>;
}

impl<T: HandTracker + ?Sized> HandTracker for Box<T> {
    fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<HandObservation>, TrackerError> {
        (**self).detect(frame)
    }
}

//! Hand landmark types and the inference seam used by the gesture pipeline.
//!
//! The TorchScript adapter lives behind the `with-tch` feature so the rest of
//! the workspace builds without libtorch.

#[cfg(feature = "with-tch")]
pub mod detector;
pub mod landmarks;
pub mod tracker;

pub use landmarks::{
    HAND_CONNECTIONS, HAND_LANDMARK_COUNT, HandObservation, INDEX_FINGER_TIP, LandmarkPoint,
    THUMB_TIP, WRIST,
};
pub use tracker::{FrameView, HandTracker, TrackerError};

#[cfg(feature = "with-tch")]
pub use tch;

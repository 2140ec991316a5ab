//! Frame acquisition for the gesture pipeline.
//!
//! Background readers push BGR8 frames into bounded channels; the pipeline
//! pulls through the [`FrameSource`] trait and falls back to
//! [`placeholder_frame`] whenever the camera has nothing to give.

#[cfg(feature = "opencv")]
mod camera;
mod ffmpeg;
mod source;
mod types;

#[cfg(feature = "opencv")]
pub use camera::spawn_camera_reader;
pub use ffmpeg::spawn_device_reader;
pub use source::{
    ChannelSource, FrameReceiver, FrameSource, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH, SourceKind,
    SourceOpener, placeholder_frame,
};
pub use types::{CaptureError, Frame, FrameFormat};

//! OpenCV-backed camera capture, enabled with the `opencv` feature.

use std::thread;

use anyhow::Result;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded};
use opencv::{
    core::{self, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, warn};

use crate::{
    source::parse_device_index,
    types::{CaptureError, Frame, FrameFormat},
};

/// Spawn a thread that reads `uri` through OpenCV and forwards BGR8 frames
/// resized to `target_size`.
///
/// Empty reads are forwarded as [`CaptureError::Malformed`] so the consumer can
/// show its placeholder instead of stalling on a camera that delivers nothing.
pub fn spawn_camera_reader(
    uri: &str,
    target_size: (i32, i32),
    fps: u32,
) -> Result<Receiver<Result<Frame, CaptureError>>> {
    let mut cap = open_video_capture(uri)?;
    configure_camera(&mut cap, target_size, fps as f64);

    let (tx, rx) = bounded(2);
    thread::Builder::new()
        .name("opencv-capture".into())
        .spawn(move || {
            if let Err(err) = capture_loop(cap, target_size, tx.clone()) {
                warn!("opencv capture stopped: {err}");
                let _ = tx.send(Err(err));
            }
        })
        .map_err(|err| CaptureError::Other(err.into()))?;

    Ok(rx)
}

fn capture_loop(
    mut cap: VideoCapture,
    target_size: (i32, i32),
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let mut frame = Mat::default();
    let mut scratch = Mat::default();
    let (target_w, target_h) = target_size;

    loop {
        let grabbed = cap
            .read(&mut frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;

        if !grabbed || size.width <= 0 || size.height <= 0 {
            let empty = Err(CaptureError::Malformed {
                expected: (target_w * target_h * 3) as usize,
                actual: 0,
            });
            if tx.send(empty).is_err() {
                break;
            }
            continue;
        }

        let working = if size.width != target_w || size.height != target_h {
            opencv::imgproc::resize(
                &frame,
                &mut scratch,
                core::Size {
                    width: target_w,
                    height: target_h,
                },
                0.0,
                0.0,
                opencv::imgproc::INTER_LINEAR,
            )
            .map_err(|e| CaptureError::Other(e.into()))?;
            &scratch
        } else {
            &frame
        };

        let data = working
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        let packet = Frame {
            data,
            width: target_w,
            height: target_h,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        };
        if tx.send(Ok(packet)).is_err() {
            break;
        }
    }

    Ok(())
}

fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    let attempts: Vec<Result<VideoCapture, opencv::Error>> = match parse_device_index(uri) {
        Some(index) => [videoio::CAP_V4L, videoio::CAP_ANY]
            .into_iter()
            .map(|backend| VideoCapture::new(index, backend))
            .collect(),
        None => vec![VideoCapture::from_file(uri, videoio::CAP_ANY)],
    };

    for attempt in attempts {
        match attempt {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    debug!(uri, "opencv capture opened");
                    return Ok(cap);
                }
            }
            Err(err) => debug!(uri, "opencv backend rejected source: {err}"),
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32), fps: f64) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, fps);
}

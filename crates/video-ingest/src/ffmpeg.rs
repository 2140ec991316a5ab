//! FFmpeg subprocess capture: decodes any source FFmpeg understands into raw
//! BGR24 frames on stdout.

use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
};

use anyhow::{Result, anyhow};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::{debug, warn};

use crate::{
    source::{SourceKind, parse_device_index},
    types::{CaptureError, Frame, FrameFormat},
};

const READER_QUEUE: usize = 2;

/// Spawn an FFmpeg process reading `uri` and yield scaled BGR8 frames through a
/// background thread.
///
/// Local devices (`0`, `/dev/video0`) go through video4linux2 on Linux and
/// AVFoundation on macOS; anything else (files, `rtsp://`, `http://`) is handed
/// to FFmpeg as-is.
pub fn spawn_device_reader(
    uri: &str,
    target_size: (i32, i32),
    fps: u32,
) -> Result<Receiver<Result<Frame, CaptureError>>> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(capture_args(uri, target_size, fps));
    debug!(uri, ?target_size, fps, "spawning ffmpeg capture");
    spawn_ffmpeg_reader(cmd, target_size)
}

/// Build the FFmpeg argument list for a capture source.
pub(crate) fn capture_args(uri: &str, target_size: (i32, i32), fps: u32) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    match SourceKind::from_uri(uri) {
        SourceKind::Device => {
            let index = parse_device_index(uri).unwrap_or(0);
            if cfg!(target_os = "macos") {
                args.extend(["-f".into(), "avfoundation".into()]);
                args.extend(["-framerate".into(), fps.to_string()]);
                args.extend(["-i".into(), format!("{index}:none")]);
            } else {
                let device = if uri.starts_with("/dev/video") {
                    uri.to_string()
                } else {
                    format!("/dev/video{index}")
                };
                args.extend(["-f".into(), "video4linux2".into()]);
                args.extend(["-framerate".into(), fps.to_string()]);
                args.extend(["-i".into(), device]);
            }
        }
        SourceKind::Rtsp => {
            args.extend(["-rtsp_transport".into(), "tcp".into()]);
            args.extend(["-fflags".into(), "nobuffer".into()]);
            args.extend(["-flags".into(), "low_delay".into()]);
            args.extend(["-i".into(), uri.to_string()]);
        }
        SourceKind::File => {
            args.push("-re".into());
            args.extend(["-stream_loop".into(), "-1".into()]);
            args.extend(["-i".into(), uri.to_string()]);
        }
    }

    args.push("-an".into());
    args.extend([
        "-vf".into(),
        format!("scale={}:{}", target_size.0, target_size.1),
    ]);
    args.extend(["-pix_fmt".into(), "bgr24".into()]);
    args.extend(["-f".into(), "rawvideo".into()]);
    args.push("-".into());
    args
}

fn spawn_ffmpeg_reader(
    mut cmd: Command,
    target_size: (i32, i32),
) -> Result<Receiver<Result<Frame, CaptureError>>> {
    let (tx, rx) = bounded(READER_QUEUE);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|err| CaptureError::Other(err.into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

    thread::Builder::new()
        .name("ffmpeg-capture".into())
        .spawn(move || {
            if let Err(err) = ffmpeg_loop(stdout, child, target_size, tx.clone()) {
                warn!("ffmpeg capture stopped: {err}");
                let _ = tx.send(Err(err));
            }
        })
        .map_err(|err| CaptureError::Other(err.into()))?;

    Ok(rx)
}

fn ffmpeg_loop(
    mut stdout: impl Read,
    mut child: Child,
    target_size: (i32, i32),
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let frame_bytes = (target_size.0 as usize) * (target_size.1 as usize) * 3;
    let mut buffer = vec![0u8; frame_bytes];
    let mut result = Ok(());

    loop {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let timestamp_ms = Utc::now().timestamp_millis();
                if tx
                    .send(Ok(Frame {
                        data: buffer.clone(),
                        width: target_size.0,
                        height: target_size.1,
                        timestamp_ms,
                        format: FrameFormat::Bgr8,
                    }))
                    .is_err()
                {
                    // Consumer dropped the receiver; stop quietly.
                    break;
                }
            }
            Err(err) => {
                result = Err(CaptureError::Other(err.into()));
                break;
            }
        }
    }

    let _ = child.kill();
    let _ = child.wait();
    result
}

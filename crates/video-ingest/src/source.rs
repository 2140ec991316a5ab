//! Pull-style frame acquisition on top of the background readers.
//!
//! Readers push frames into a small bounded channel; [`ChannelSource`] pulls
//! one frame per call with a timeout and transparently reopens the reader when
//! it dies. Callers substitute [`placeholder_frame`] whenever acquisition fails.

use std::{
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{info, warn};

use crate::types::{CaptureError, Frame};

pub const PLACEHOLDER_WIDTH: i32 = 640;
pub const PLACEHOLDER_HEIGHT: i32 = 480;

const DEFAULT_REOPEN_BACKOFF: Duration = Duration::from_secs(2);

pub type FrameReceiver = Receiver<Result<Frame, CaptureError>>;

/// Factory used to (re)start a background reader.
pub type SourceOpener = Box<dyn FnMut() -> anyhow::Result<FrameReceiver> + Send>;

/// Anything that can hand the pipeline one frame at a time.
pub trait FrameSource: Send {
    /// Block for at most the source's timeout and return the next frame.
    fn acquire(&mut self) -> Result<Frame, CaptureError>;
}

/// Fixed-size black frame shown while the camera is unavailable.
pub fn placeholder_frame() -> Frame {
    Frame::blank(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Coarse classification of a capture URI.
pub enum SourceKind {
    /// Local camera by index or `/dev/videoN` path.
    Device,
    /// Real-time streaming protocol feeds.
    Rtsp,
    /// Files and any other URL FFmpeg can open.
    File,
}

impl SourceKind {
    pub fn from_uri(uri: &str) -> Self {
        if uri.starts_with("rtsp://") || uri.starts_with("rtsps://") {
            SourceKind::Rtsp
        } else if parse_device_index(uri).is_some() || uri.starts_with("/dev/video") {
            SourceKind::Device
        } else {
            SourceKind::File
        }
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

/// [`FrameSource`] over a background reader channel with automatic reopen.
pub struct ChannelSource {
    label: String,
    opener: SourceOpener,
    receiver: Option<FrameReceiver>,
    timeout: Duration,
    reopen_backoff: Duration,
    next_attempt: Option<Instant>,
}

impl ChannelSource {
    /// The reader is opened lazily on the first [`FrameSource::acquire`] call.
    pub fn new(label: impl Into<String>, opener: SourceOpener, timeout: Duration) -> Self {
        Self {
            label: label.into(),
            opener,
            receiver: None,
            timeout,
            reopen_backoff: DEFAULT_REOPEN_BACKOFF,
            next_attempt: None,
        }
    }

    pub fn with_reopen_backoff(mut self, backoff: Duration) -> Self {
        self.reopen_backoff = backoff;
        self
    }

    pub fn is_open(&self) -> bool {
        self.receiver.is_some()
    }

    fn disconnect(&mut self) {
        self.receiver = None;
        self.next_attempt = Some(Instant::now() + self.reopen_backoff);
    }

    fn ensure_open(&mut self) -> Result<(), CaptureError> {
        if self.receiver.is_some() {
            return Ok(());
        }

        let now = Instant::now();
        if let Some(at) = self.next_attempt {
            if now < at {
                // Pace placeholder output instead of spinning while the camera is away.
                thread::sleep(self.timeout.min(at - now));
                return Err(CaptureError::Disconnected);
            }
        }

        match (self.opener)() {
            Ok(rx) => {
                info!(source = %self.label, "capture source opened");
                self.receiver = Some(rx);
                self.next_attempt = None;
                Ok(())
            }
            Err(err) => {
                warn!(source = %self.label, "failed to open capture source: {err:#}");
                self.next_attempt = Some(now + self.reopen_backoff);
                Err(CaptureError::Open {
                    uri: self.label.clone(),
                })
            }
        }
    }
}

impl FrameSource for ChannelSource {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        self.ensure_open()?;
        let Some(rx) = self.receiver.as_ref() else {
            return Err(CaptureError::Disconnected);
        };

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(frame)) => {
                frame.validate()?;
                Ok(frame)
            }
            Ok(Err(err @ CaptureError::Malformed { .. })) => Err(err),
            Ok(Err(err)) => {
                self.disconnect();
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                self.disconnect();
                Err(CaptureError::Disconnected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use anyhow::anyhow;
    use crossbeam_channel::{Sender, bounded};

    use super::*;
    use crate::types::FrameFormat;

    fn tiny_frame() -> Frame {
        Frame {
            data: vec![7; 2 * 2 * 3],
            width: 2,
            height: 2,
            timestamp_ms: 1,
            format: FrameFormat::Bgr8,
        }
    }

    fn source_with(
        senders: Arc<std::sync::Mutex<Vec<Sender<Result<Frame, CaptureError>>>>>,
        opens: Arc<AtomicUsize>,
    ) -> ChannelSource {
        let opener: SourceOpener = Box::new(move || {
            opens.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = bounded(4);
            senders
                .lock()
                .map_err(|_| anyhow!("poisoned"))?
                .push(tx);
            Ok(rx)
        });
        ChannelSource::new("test", opener, Duration::from_millis(20))
            .with_reopen_backoff(Duration::ZERO)
    }

    #[test]
    fn device_kinds_are_inferred_from_uri() {
        assert_eq!(SourceKind::from_uri("0"), SourceKind::Device);
        assert_eq!(SourceKind::from_uri("/dev/video3"), SourceKind::Device);
        assert_eq!(SourceKind::from_uri("rtsp://host/feed"), SourceKind::Rtsp);
        assert_eq!(SourceKind::from_uri("clip.mp4"), SourceKind::File);
        assert_eq!(parse_device_index("/dev/video12"), Some(12));
        assert_eq!(parse_device_index("/dev/video"), None);
    }

    #[test]
    fn placeholder_has_fixed_dimensions() {
        let frame = placeholder_frame();
        assert_eq!((frame.width, frame.height), (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT));
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn delivers_frames_from_reader() {
        let senders = Arc::new(std::sync::Mutex::new(Vec::new()));
        let opens = Arc::new(AtomicUsize::new(0));
        let mut source = source_with(senders.clone(), opens.clone());

        // Nothing queued yet: the reader opens, then the pull times out.
        assert!(matches!(source.acquire(), Err(CaptureError::Timeout { .. })));
        senders.lock().unwrap()[0].send(Ok(tiny_frame())).unwrap();
        let frame = source.acquire().expect("frame");
        assert_eq!(frame.width, 2);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        let senders = Arc::new(std::sync::Mutex::new(Vec::new()));
        let opens = Arc::new(AtomicUsize::new(0));
        let mut source = source_with(senders.clone(), opens);
        let _ = source.acquire();

        let mut broken = tiny_frame();
        broken.data.truncate(5);
        senders.lock().unwrap()[0].send(Ok(broken)).unwrap();
        assert!(matches!(
            source.acquire(),
            Err(CaptureError::Malformed { .. })
        ));
        assert!(source.is_open());
    }

    #[test]
    fn reopens_after_reader_disconnects() {
        let senders = Arc::new(std::sync::Mutex::new(Vec::new()));
        let opens = Arc::new(AtomicUsize::new(0));
        let mut source = source_with(senders.clone(), opens.clone());
        let _ = source.acquire();

        senders.lock().unwrap().clear();
        assert!(matches!(source.acquire(), Err(CaptureError::Disconnected)));
        assert!(!source.is_open());

        let _ = source.acquire();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert!(source.is_open());
    }

    #[test]
    fn opener_failure_surfaces_as_open_error() {
        let opener: SourceOpener = Box::new(|| Err(anyhow!("no camera")));
        let mut source = ChannelSource::new("cam0", opener, Duration::from_millis(5));
        match source.acquire() {
            Err(CaptureError::Open { uri }) => assert_eq!(uri, "cam0"),
            other => panic!("unexpected: {:?}", other.map(|f| f.width)),
        }
    }
}

//! Command-line configuration.
//!
//! Clap parses raw flags into [`ServeArgs`]; `TryFrom` validates them into an
//! [`AppConfig`] that the rest of the application consumes without re-parsing.

use std::{fmt, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use video_ingest::SourceKind;

use crate::control::{
    actuator::{NullVolume, OsaScriptVolume, PactlVolume, VolumeControl},
    history::DEFAULT_HISTORY_CAPACITY,
    metric::GestureCalibration,
};

pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CaptureBackendKind {
    /// FFmpeg subprocess decoding to raw BGR.
    Ffmpeg,
    /// OpenCV `VideoCapture` (requires the `opencv` feature).
    Opencv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum VolumeBackend {
    /// PulseAudio / PipeWire via `pactl`.
    Pactl,
    /// macOS via `osascript`.
    Osascript,
    /// Log volume changes without touching a device.
    None,
}

impl VolumeBackend {
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            VolumeBackend::Osascript
        } else {
            VolumeBackend::Pactl
        }
    }

    pub fn control(self) -> Box<dyn VolumeControl> {
        match self {
            VolumeBackend::Pactl => Box::new(PactlVolume),
            VolumeBackend::Osascript => Box::new(OsaScriptVolume),
            VolumeBackend::None => Box::new(NullVolume::default()),
        }
    }
}

impl fmt::Display for VolumeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VolumeBackend::Pactl => "pactl",
            VolumeBackend::Osascript => "osascript",
            VolumeBackend::None => "none",
        })
    }
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Lower the default log level to `debug`.
    pub verbose: bool,
}

#[derive(Clone, Debug)]
/// Validated configuration for the `serve` command.
pub struct AppConfig {
    pub source: String,
    pub source_kind: SourceKind,
    pub capture_backend: CaptureBackendKind,
    pub width: i32,
    pub height: i32,
    pub fps: u32,
    pub acquire_timeout: Duration,
    pub mirror: bool,
    pub model_path: Option<PathBuf>,
    pub use_cpu: bool,
    pub min_confidence: f32,
    pub max_hands: usize,
    pub bind: SocketAddr,
    pub jpeg_quality: u8,
    pub history_capacity: usize,
    pub volume_backend: VolumeBackend,
    pub calibration: GestureCalibration,
    pub start_running: bool,
    pub telemetry: TelemetryOptions,
}

/// CLI arguments accepted by the `serve` subcommand.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Camera index, `/dev/videoN`, RTSP URL or video file.
    #[arg(long, value_name = "URI", default_value = "0")]
    pub source: String,
    /// Capture width in pixels.
    #[arg(long, value_name = "PX", default_value_t = 640)]
    pub width: i32,
    /// Capture height in pixels.
    #[arg(long, value_name = "PX", default_value_t = 480)]
    pub height: i32,
    /// Requested capture frame rate.
    #[arg(long, value_name = "FPS", default_value_t = 30)]
    pub fps: u32,
    /// Frame decoder used for the source.
    #[arg(long, value_enum, default_value_t = CaptureBackendKind::Ffmpeg)]
    pub capture_backend: CaptureBackendKind,
    /// TorchScript hand landmark model.
    #[arg(long = "model", value_name = "PATH")]
    pub model_path: Option<PathBuf>,
    /// Force CPU inference.
    #[arg(long = "cpu", action = clap::ArgAction::SetTrue)]
    pub use_cpu: bool,
    /// Minimum hand presence score.
    #[arg(long, value_name = "SCORE", default_value_t = 0.7)]
    pub min_confidence: f32,
    /// Maximum number of hands returned by the tracker.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub max_hands: usize,
    /// HTTP listen address.
    #[arg(long, value_name = "ADDR", default_value = DEFAULT_BIND)]
    pub bind: String,
    /// JPEG quality used by the stream encoder (1-100).
    #[arg(long, value_name = "QUALITY", default_value_t = 85)]
    pub jpeg_quality: i32,
    /// Telemetry records kept before the oldest is evicted.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    pub history_capacity: usize,
    /// Output volume backend (defaults to the platform's native one).
    #[arg(long, value_enum)]
    pub volume_backend: Option<VolumeBackend>,
    /// Pinch distance mapped to 0 % volume.
    #[arg(long, value_name = "PX", default_value_t = 30.0)]
    pub near_px: f64,
    /// Pinch distance mapped to 100 % volume.
    #[arg(long, value_name = "PX", default_value_t = 300.0)]
    pub far_px: f64,
    /// Distances above this are labelled `Open`.
    #[arg(long, value_name = "PX", default_value_t = 50.0)]
    pub open_threshold_px: f64,
    /// Keep the camera image unmirrored.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_mirror: bool,
    /// Start with volume control paused.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub start_paused: bool,
    /// How long to wait for a frame before showing the placeholder.
    #[arg(long, value_name = "MS", default_value_t = 1_000)]
    pub acquire_timeout_ms: u64,
    /// Enable debug logging.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

/// CLI arguments accepted by the `volume` subcommand.
#[derive(Debug, Args)]
pub struct VolumeArgs {
    /// Output volume backend (defaults to the platform's native one).
    #[arg(long, value_enum)]
    pub backend: Option<VolumeBackend>,
    /// Set the output volume to this percentage after reading it.
    #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub set: Option<u8>,
}

impl TryFrom<ServeArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeArgs) -> Result<Self> {
        if args.source.trim().is_empty() {
            bail!("--source must not be empty");
        }
        if args.width <= 0 || args.height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        if args.fps == 0 {
            bail!("--fps must be at least 1");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.history_capacity == 0 {
            bail!("--history-capacity must be at least 1");
        }
        if !(0.0..=1.0).contains(&args.min_confidence) {
            bail!("--min-confidence must lie in [0, 1]");
        }
        if args.max_hands == 0 {
            bail!("--max-hands must be at least 1");
        }
        if args.acquire_timeout_ms == 0 {
            bail!("--acquire-timeout-ms must be at least 1");
        }

        let bind: SocketAddr = args
            .bind
            .parse()
            .with_context(|| format!("invalid --bind address `{}`", args.bind))?;

        let calibration = GestureCalibration {
            near_px: args.near_px,
            far_px: args.far_px,
            open_threshold_px: args.open_threshold_px,
            ..GestureCalibration::default()
        };
        calibration.validate().context("invalid gesture calibration")?;

        if args.capture_backend == CaptureBackendKind::Opencv && !cfg!(feature = "opencv") {
            bail!("--capture-backend opencv requires building with the `opencv` feature");
        }

        let source_kind = SourceKind::from_uri(&args.source);

        Ok(Self {
            source: args.source,
            source_kind,
            capture_backend: args.capture_backend,
            width: args.width,
            height: args.height,
            fps: args.fps,
            acquire_timeout: Duration::from_millis(args.acquire_timeout_ms),
            mirror: !args.no_mirror,
            model_path: args.model_path,
            use_cpu: args.use_cpu,
            min_confidence: args.min_confidence,
            max_hands: args.max_hands,
            bind,
            jpeg_quality: args.jpeg_quality as u8,
            history_capacity: args.history_capacity,
            volume_backend: args
                .volume_backend
                .unwrap_or_else(VolumeBackend::platform_default),
            calibration,
            start_running: !args.start_paused,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
                verbose: args.verbose,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        serve: ServeArgs,
    }

    fn parse(args: &[&str]) -> Result<AppConfig> {
        let harness = Harness::try_parse_from(std::iter::once("serve").chain(args.iter().copied()))?;
        AppConfig::try_from(harness.serve)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.source, "0");
        assert_eq!(config.source_kind, SourceKind::Device);
        assert_eq!(config.bind.port(), 5000);
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(config.calibration, GestureCalibration::default());
        assert!(config.mirror);
        assert!(config.start_running);
        assert_eq!(config.acquire_timeout, Duration::from_secs(1));
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--source",
            "rtsp://cam/stream",
            "--bind",
            "127.0.0.1:8088",
            "--volume-backend",
            "none",
            "--near-px",
            "20",
            "--far-px",
            "220",
            "--open-threshold-px",
            "80",
            "--no-mirror",
            "--start-paused",
        ])
        .unwrap();
        assert_eq!(config.source_kind, SourceKind::Rtsp);
        assert_eq!(config.bind.port(), 8088);
        assert_eq!(config.volume_backend, VolumeBackend::None);
        assert_eq!(config.calibration.open_threshold_px, 80.0);
        assert!(!config.mirror);
        assert!(!config.start_running);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--history-capacity", "0"]).is_err());
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--bind", "not-an-addr"]).is_err());
        assert!(parse(&["--near-px", "300", "--far-px", "30"]).is_err());
        assert!(parse(&["--min-confidence", "1.5"]).is_err());
    }
}

//! Frame loop tying capture, hand tracking, volume control and the preview
//! stream together, plus the `serve` entry point that wires it to the HTTP
//! server.

use std::{
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use actix_web::web::Bytes;
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use ml_core::{FrameView, HandObservation, HandTracker};
use tracing::{debug, error, info, warn};
use video_ingest::{CaptureError, ChannelSource, Frame, FrameSource, SourceOpener, placeholder_frame};

use crate::control::{
    actuator::VolumeActuator,
    annotation::{FrameFooter, HandOverlay, StreamStatus, annotate_frame},
    config::{AppConfig, CaptureBackendKind},
    data::{FramePacket, SharedFrame, publish_frame, shared_frame},
    encoding::encode_jpeg,
    metric::{GestureMetric, GestureSample},
    server::spawn_http_server,
    state::SessionState,
    telemetry,
};

/// What one iteration did with its frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IterationOutcome {
    /// No frame was available; a placeholder was streamed instead.
    Placeholder,
    /// Volume control is paused; the frame was streamed untouched.
    Paused,
    NoHands,
    TrackerFailed,
    Sample(GestureSample),
}

#[derive(Clone, Copy, Debug)]
pub struct IterationReport {
    pub frame_number: u64,
    pub outcome: IterationOutcome,
    /// Whether a packet reached the shared frame slot.
    pub published: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct LoopOptions {
    pub mirror: bool,
    pub jpeg_quality: u8,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            mirror: true,
            jpeg_quality: 85,
        }
    }
}

/// Single-threaded acquire → detect → actuate → annotate → publish loop.
pub struct PipelineLoop {
    source: Box<dyn FrameSource>,
    tracker: Box<dyn HandTracker>,
    actuator: VolumeActuator,
    metric: GestureMetric,
    session: Arc<SessionState>,
    latest: SharedFrame,
    options: LoopOptions,
    frame_number: u64,
    fps: f32,
    last_frame_at: Option<Instant>,
    last_sample_at: Option<Instant>,
}

impl PipelineLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        tracker: Box<dyn HandTracker>,
        actuator: VolumeActuator,
        metric: GestureMetric,
        session: Arc<SessionState>,
        latest: SharedFrame,
    ) -> Self {
        Self {
            source,
            tracker,
            actuator,
            metric,
            session,
            latest,
            options: LoopOptions::default(),
            frame_number: 0,
            fps: 0.0,
            last_frame_at: None,
            last_sample_at: None,
        }
    }

    pub fn with_options(mut self, options: LoopOptions) -> Self {
        self.options = options;
        self
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn actuator(&self) -> &VolumeActuator {
        &self.actuator
    }

    pub fn step(&mut self) -> IterationReport {
        self.step_at(Instant::now())
    }

    /// Run one iteration as if the frame arrived at `now`.
    pub fn step_at(&mut self, now: Instant) -> IterationReport {
        self.frame_number += 1;
        self.update_fps(now);
        let frame_span = tracing::info_span!(
            "gesture.frame",
            frame = self.frame_number,
            outcome = tracing::field::Empty
        );
        let _frame_guard = frame_span.enter();
        let started = Instant::now();

        let frame = tracing::info_span!("gesture.acquire").in_scope(|| self.acquire());
        let (frame, placeholder) = match frame {
            Some(frame) => (frame, false),
            None => (placeholder_frame(), true),
        };

        let running = self.session.is_running();
        let mut hand: Option<HandObservation> = None;
        let outcome = if placeholder {
            IterationOutcome::Placeholder
        } else if !running {
            IterationOutcome::Paused
        } else {
            tracing::info_span!("gesture.detect").in_scope(|| self.detect(&frame, now, &mut hand))
        };
        frame_span.record("outcome", tracing::field::debug(&outcome));

        let status = match outcome {
            IterationOutcome::Placeholder => StreamStatus::NoSignal,
            IterationOutcome::Paused => StreamStatus::Paused,
            _ => StreamStatus::Live,
        };
        let overlay = match (&hand, outcome) {
            (Some(hand), IterationOutcome::Sample(sample)) => Some(HandOverlay {
                hand,
                distance_px: sample.distance_px,
                volume_percent: sample.volume_percent,
            }),
            _ => None,
        };

        let published = tracing::info_span!("gesture.encode").in_scope(|| {
            match self.render(&frame, overlay, status, placeholder) {
                Ok(packet) => {
                    publish_frame(&self.latest, packet);
                    true
                }
                Err(err) => {
                    error!("failed to encode frame {}: {err:#}", self.frame_number);
                    metrics::counter!("gesture_encode_errors_total").increment(1);
                    false
                }
            }
        });

        metrics::counter!("gesture_frames_total").increment(1);
        metrics::gauge!("gesture_fps").set(f64::from(self.fps));
        metrics::histogram!("gesture_iteration_seconds").record(started.elapsed().as_secs_f64());

        IterationReport {
            frame_number: self.frame_number,
            outcome,
            published,
        }
    }

    /// Loop until `shutdown` is raised.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        info!("gesture pipeline started");
        while !shutdown.load(Ordering::SeqCst) {
            self.step();
        }
        info!(frames = self.frame_number, "gesture pipeline stopped");
    }

    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> std::io::Result<thread::JoinHandle<()>> {
        telemetry::spawn_thread("gesture-pipeline", move || self.run(shutdown))
    }

    fn update_fps(&mut self, now: Instant) {
        if let Some(last) = self.last_frame_at {
            let dt = now.saturating_duration_since(last).as_secs_f32();
            if dt > 0.0 {
                let instant = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    instant
                } else {
                    self.fps * 0.9 + instant * 0.1
                };
            }
        }
        self.last_frame_at = Some(now);
    }

    fn acquire(&mut self) -> Option<Frame> {
        let result = self
            .source
            .acquire()
            .and_then(|frame| frame.validate().map(|()| frame));
        match result {
            Ok(mut frame) => {
                if self.options.mirror {
                    frame.mirror_horizontal();
                }
                Some(frame)
            }
            Err(err) => {
                let reason = match err {
                    CaptureError::Timeout { .. } => "timeout",
                    CaptureError::Disconnected | CaptureError::Open { .. } => "disconnected",
                    CaptureError::Malformed { .. } => "malformed",
                    CaptureError::Other(_) => "error",
                };
                debug!("frame acquisition failed ({reason}): {err}");
                metrics::counter!("gesture_acquire_failures_total", "reason" => reason)
                    .increment(1);
                None
            }
        }
    }

    fn detect(
        &mut self,
        frame: &Frame,
        now: Instant,
        hand_out: &mut Option<HandObservation>,
    ) -> IterationOutcome {
        let view = FrameView {
            bgr: &frame.data,
            width: frame.width,
            height: frame.height,
        };
        let hands = match self.tracker.detect(view) {
            Ok(hands) => hands,
            Err(err) => {
                warn!("hand tracking failed: {err}");
                metrics::counter!("gesture_tracker_errors_total").increment(1);
                return IterationOutcome::TrackerFailed;
            }
        };

        let Some(hand) = hands.into_iter().next() else {
            return IterationOutcome::NoHands;
        };
        let hand = hand.clamped_to(frame.width, frame.height);
        let Some((thumb, index)) = hand.pinch_pair() else {
            return IterationOutcome::NoHands;
        };

        let sample = self.metric.compute(thumb, index, self.last_sample_at, now);
        self.last_sample_at = Some(now);
        self.actuator.apply(sample.volume_percent);
        self.session.record(sample, Utc::now());
        metrics::histogram!("gesture_pinch_distance_px").record(sample.distance_px);
        debug!(
            distance = sample.distance_px,
            volume = sample.volume_percent,
            gesture = %sample.gesture,
            "pinch sample"
        );
        *hand_out = Some(hand);
        IterationOutcome::Sample(sample)
    }

    fn render(
        &self,
        frame: &Frame,
        overlay: Option<HandOverlay<'_>>,
        status: StreamStatus,
        placeholder: bool,
    ) -> Result<FramePacket> {
        let footer = FrameFooter {
            frame_number: self.frame_number,
            fps: self.fps,
            status,
        };
        let image = annotate_frame(frame, overlay, footer, self.metric.calibration())?;
        let jpeg = encode_jpeg(image, self.options.jpeg_quality)?;
        Ok(FramePacket {
            jpeg: Bytes::from(jpeg),
            frame_number: self.frame_number,
            timestamp_ms: frame.timestamp_ms,
            fps: self.fps,
            placeholder,
        })
    }
}

/// Model input resolution (width, height) for the landmark network.
#[cfg(feature = "with-tch")]
const MODEL_INPUT_SIZE: (i64, i64) = (224, 224);

#[cfg(feature = "with-tch")]
fn build_tracker(config: &AppConfig) -> Result<Box<dyn HandTracker>> {
    use ml_core::{detector::HandLandmarkModel, tch::Device};

    use crate::control::runtime::load_torch_cuda_runtime;

    let model_path = config
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("Missing model path. Provide --model <path>."))?;
    let device = if config.use_cpu {
        Device::Cpu
    } else {
        load_torch_cuda_runtime();
        Device::cuda_if_available()
    };
    let model = HandLandmarkModel::new(model_path, device, MODEL_INPUT_SIZE)
        .with_context(|| format!("Failed to load hand model {}", model_path.display()))?
        .with_min_confidence(config.min_confidence)
        .with_max_hands(config.max_hands);
    info!(model = %model_path.display(), device = ?model.device(), "hand tracker ready");
    Ok(Box::new(model))
}

#[cfg(not(feature = "with-tch"))]
fn build_tracker(_config: &AppConfig) -> Result<Box<dyn HandTracker>> {
    Err(anyhow!(
        "hand tracking requires the TorchScript backend; rebuild with `--features with-tch`"
    ))
}

fn build_source(config: &AppConfig) -> Box<dyn FrameSource> {
    let uri = config.source.clone();
    let size = (config.width, config.height);
    let fps = config.fps;
    let opener: SourceOpener = match config.capture_backend {
        CaptureBackendKind::Ffmpeg => {
            Box::new(move || video_ingest::spawn_device_reader(&uri, size, fps))
        }
        #[cfg(feature = "opencv")]
        CaptureBackendKind::Opencv => {
            Box::new(move || video_ingest::spawn_camera_reader(&uri, size, fps))
        }
        #[cfg(not(feature = "opencv"))]
        CaptureBackendKind::Opencv => Box::new(move || {
            Err(anyhow!(
                "OpenCV capture of {uri} needs the `opencv` feature"
            ))
        }),
    };
    Box::new(ChannelSource::new(
        config.source.clone(),
        opener,
        config.acquire_timeout,
    ))
}

fn install_ctrlc(shutdown: &Arc<AtomicBool>) {
    static CTRL_HANDLER: Once = Once::new();
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });
}

/// Run the gesture pipeline and HTTP server until Ctrl+C.
pub fn run(config: AppConfig) -> Result<()> {
    let _telemetry_guard = telemetry::install_tracing(&config.telemetry);
    let _ = telemetry::init_metrics_recorder();
    let serve_span = tracing::info_span!(
        "gesture.serve",
        source = %config.source,
        source_kind = ?config.source_kind,
        width = config.width,
        height = config.height,
        bind = %config.bind,
        volume_backend = %config.volume_backend
    );
    let _serve_guard = serve_span.enter();

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc(&shutdown);

    let tracker = build_tracker(&config)?;
    let actuator = VolumeActuator::new(config.volume_backend.control()).with_context(|| {
        format!(
            "Volume backend `{}` is unavailable; pass --volume-backend none to run without one",
            config.volume_backend
        )
    })?;
    let source = build_source(&config);

    let session = Arc::new(SessionState::new(
        config.history_capacity,
        config.start_running,
    ));
    let latest = shared_frame();
    let server = spawn_http_server(config.bind, session.clone(), latest.clone())?;

    let pipeline = PipelineLoop::new(
        source,
        tracker,
        actuator,
        GestureMetric::new(config.calibration),
        session,
        latest,
    )
    .with_options(LoopOptions {
        mirror: config.mirror,
        jpeg_quality: config.jpeg_quality,
    })
    .spawn(shutdown.clone())
    .context("Failed to spawn pipeline thread")?;

    while !shutdown.load(Ordering::SeqCst) && !pipeline.is_finished() {
        thread::sleep(Duration::from_millis(100));
    }
    shutdown.store(true, Ordering::SeqCst);
    info!("shutting down");

    let joined = pipeline.join();
    server.stop();
    joined.map_err(|_| anyhow!("gesture pipeline thread panicked"))
}

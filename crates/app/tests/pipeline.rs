use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use gesture_volume::control::{
    actuator::{ActuatorError, VolumeActuator, VolumeControl},
    data::{SharedFrame, latest_frame, shared_frame},
    metric::{GestureLabel, GestureMetric},
    pipeline::{IterationOutcome, PipelineLoop},
    state::SessionState,
};
use ml_core::{
    FrameView, HAND_LANDMARK_COUNT, HandObservation, HandTracker, INDEX_FINGER_TIP, LandmarkPoint,
    THUMB_TIP, TrackerError,
};
use video_ingest::{CaptureError, Frame, FrameSource};

struct ScriptedSource {
    frames: VecDeque<Result<Frame, CaptureError>>,
}

impl FrameSource for ScriptedSource {
    fn acquire(&mut self) -> Result<Frame, CaptureError> {
        self.frames
            .pop_front()
            .unwrap_or_else(|| Ok(Frame::blank(160, 120)))
    }
}

fn live_source() -> Box<dyn FrameSource> {
    Box::new(ScriptedSource {
        frames: VecDeque::new(),
    })
}

#[derive(Clone, Default)]
struct ScriptedTracker {
    results: Arc<Mutex<VecDeque<Result<Vec<HandObservation>, TrackerError>>>>,
}

impl ScriptedTracker {
    fn push_hand(&self, thumb: (i32, i32), index: (i32, i32)) {
        self.results
            .lock()
            .unwrap()
            .push_back(Ok(vec![hand(thumb, index)]));
    }

    fn push(&self, result: Result<Vec<HandObservation>, TrackerError>) {
        self.results.lock().unwrap().push_back(result);
    }
}

impl HandTracker for ScriptedTracker {
    fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<HandObservation>, TrackerError> {
        frame.check()?;
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Clone, Default)]
struct RecordingVolume {
    levels: Arc<Mutex<Vec<f64>>>,
    fail_sets: bool,
}

impl VolumeControl for RecordingVolume {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn level_range(&self) -> (f64, f64) {
        (0.0, 100.0)
    }

    fn current_level(&mut self) -> Result<f64, ActuatorError> {
        Ok(50.0)
    }

    fn set_level(&mut self, level: f64) -> Result<(), ActuatorError> {
        if self.fail_sets {
            return Err(ActuatorError::Unavailable("sink vanished".into()));
        }
        self.levels.lock().unwrap().push(level);
        Ok(())
    }
}

fn hand(thumb: (i32, i32), index: (i32, i32)) -> HandObservation {
    let mut points = [LandmarkPoint::new(80, 60); HAND_LANDMARK_COUNT];
    points[THUMB_TIP] = LandmarkPoint::new(thumb.0, thumb.1);
    points[INDEX_FINGER_TIP] = LandmarkPoint::new(index.0, index.1);
    HandObservation::new(points)
}

struct Harness {
    pipeline: PipelineLoop,
    tracker: ScriptedTracker,
    volume: RecordingVolume,
    session: Arc<SessionState>,
    latest: SharedFrame,
}

fn harness_with(source: Box<dyn FrameSource>, volume: RecordingVolume) -> Harness {
    let tracker = ScriptedTracker::default();
    let session = Arc::new(SessionState::new(100, true));
    let latest = shared_frame();
    let actuator = VolumeActuator::new(Box::new(volume.clone())).unwrap();
    let pipeline = PipelineLoop::new(
        source,
        Box::new(tracker.clone()),
        actuator,
        GestureMetric::default(),
        session.clone(),
        latest.clone(),
    );
    Harness {
        pipeline,
        tracker,
        volume,
        session,
        latest,
    }
}

fn harness() -> Harness {
    harness_with(live_source(), RecordingVolume::default())
}

#[test]
fn acquisition_failure_publishes_placeholder() {
    let source = ScriptedSource {
        frames: VecDeque::from([Err(CaptureError::Disconnected)]),
    };
    let mut h = harness_with(Box::new(source), RecordingVolume::default());

    let report = h.pipeline.step();
    assert_eq!(report.outcome, IterationOutcome::Placeholder);
    assert!(report.published);

    let packet = latest_frame(&h.latest).expect("placeholder published");
    assert!(packet.placeholder);
    assert_eq!(packet.frame_number, 1);
    assert_eq!(&packet.jpeg[..2], &[0xFF, 0xD8]);
    assert_eq!(h.session.live().samples_total, 0);
    assert_eq!(h.session.history_len(), 0);
}

#[test]
fn malformed_frame_is_replaced_by_placeholder() {
    let mut bad = Frame::blank(16, 16);
    bad.data.truncate(7);
    let source = ScriptedSource {
        frames: VecDeque::from([Ok(bad)]),
    };
    let mut h = harness_with(Box::new(source), RecordingVolume::default());
    assert_eq!(h.pipeline.step().outcome, IterationOutcome::Placeholder);
}

#[test]
fn pinch_updates_live_state_history_and_volume() {
    let mut h = harness();
    h.tracker.push_hand((100, 100), (100, 130));

    let report = h.pipeline.step();
    let IterationOutcome::Sample(sample) = report.outcome else {
        panic!("expected a sample, got {:?}", report.outcome);
    };
    assert_eq!(sample.distance_px, 30.0);
    assert_eq!(sample.volume_percent, 0);
    assert_eq!(sample.gesture, GestureLabel::Closed);
    assert_eq!(sample.accuracy_percent, 75.0);

    let live = h.session.live();
    assert_eq!(live.sample, sample);
    assert_eq!(h.session.history_len(), 1);
    assert_eq!(*h.volume.levels.lock().unwrap(), vec![0.0]);
    assert!(!latest_frame(&h.latest).unwrap().placeholder);
}

#[test]
fn paused_freezes_volume_but_keeps_streaming() {
    let mut h = harness();
    h.tracker.push_hand((0, 0), (300, 0));
    h.pipeline.step();
    assert_eq!(h.session.live().sample.volume_percent, 100);

    h.session.set_running(false);
    h.tracker.push_hand((0, 0), (30, 0));
    let first = h.pipeline.step();
    let second = h.pipeline.step();

    assert_eq!(first.outcome, IterationOutcome::Paused);
    assert!(first.published && second.published);
    assert_eq!(latest_frame(&h.latest).unwrap().frame_number, 3);
    assert_eq!(h.session.live().sample.volume_percent, 100);
    assert_eq!(h.session.history_len(), 1);
    assert_eq!(h.volume.levels.lock().unwrap().len(), 1);
}

#[test]
fn zero_hands_leaves_state_untouched() {
    let mut h = harness();
    h.tracker.push(Ok(Vec::new()));
    let report = h.pipeline.step();
    assert_eq!(report.outcome, IterationOutcome::NoHands);
    assert!(report.published);
    assert_eq!(h.session.live().samples_total, 0);
    assert_eq!(h.session.history_len(), 0);
    assert!(h.volume.levels.lock().unwrap().is_empty());
}

#[test]
fn only_first_hand_is_used() {
    let mut h = harness();
    h.tracker
        .push(Ok(vec![hand((0, 0), (300, 0)), hand((0, 0), (30, 0))]));
    let IterationOutcome::Sample(sample) = h.pipeline.step().outcome else {
        panic!("expected a sample");
    };
    assert_eq!(sample.volume_percent, 100);
}

#[test]
fn tracker_errors_skip_only_that_iteration() {
    let mut h = harness();
    h.tracker
        .push(Err(TrackerError::UnsupportedFrame("corrupt".into())));
    h.tracker.push_hand((0, 0), (165, 0));

    assert_eq!(h.pipeline.step().outcome, IterationOutcome::TrackerFailed);
    assert_eq!(h.session.history_len(), 0);
    assert!(matches!(
        h.pipeline.step().outcome,
        IterationOutcome::Sample(_)
    ));
    assert_eq!(h.session.history_len(), 1);
}

#[test]
fn actuator_failure_does_not_stop_recording() {
    let volume = RecordingVolume {
        fail_sets: true,
        ..RecordingVolume::default()
    };
    let mut h = harness_with(live_source(), volume);
    h.tracker.push_hand((0, 0), (120, 0));
    h.tracker.push_hand((0, 0), (220, 0));

    h.pipeline.step();
    h.pipeline.step();

    assert_eq!(h.session.history_len(), 2);
    assert_eq!(h.pipeline.actuator().failures(), 2);
    assert!(latest_frame(&h.latest).is_some());
}

#[test]
fn out_of_frame_landmarks_are_clamped_before_use() {
    let mut h = harness();
    h.tracker.push_hand((i32::MIN + 1, 0), (i32::MAX, 0));

    let report = h.pipeline.step();
    let IterationOutcome::Sample(sample) = report.outcome else {
        panic!("expected a sample, got {:?}", report.outcome);
    };
    // Harness frames are 160x120.
    assert_eq!(sample.distance_px, 159.0);
    assert!(report.published);
    assert_eq!(h.session.history_len(), 1);
}

#[test]
fn response_time_spans_samples_not_frames() {
    let mut h = harness();
    let t0 = Instant::now();
    h.tracker.push_hand((0, 0), (100, 0));
    h.tracker.push(Ok(Vec::new()));
    h.tracker.push_hand((0, 0), (250, 0));

    h.pipeline.step_at(t0);
    h.pipeline.step_at(t0 + Duration::from_millis(20));
    let IterationOutcome::Sample(second) = h.pipeline.step_at(t0 + Duration::from_millis(40)).outcome
    else {
        panic!("expected a sample");
    };

    assert!((second.response_time_ms - 40.0).abs() < 0.01);
    let history = h.session.snapshot_history();
    assert_eq!(history[0].response_time_ms, 0.0);
    assert!(history[0].timestamp <= history[1].timestamp);
}

#[test]
fn fps_is_smoothed() {
    let mut h = harness();
    let t0 = Instant::now();
    h.pipeline.step_at(t0);
    h.pipeline.step_at(t0 + Duration::from_millis(50));
    assert!((h.pipeline.fps() - 20.0).abs() < 0.01);
    h.pipeline.step_at(t0 + Duration::from_millis(75));
    assert!((h.pipeline.fps() - 22.0).abs() < 0.01);
}

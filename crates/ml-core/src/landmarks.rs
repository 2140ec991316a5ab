//! Fixed-shape hand landmark values.
//!
//! Index layout follows the common 21-point hand topology: wrist at 0, then
//! four joints per finger from thumb (1..=4) to pinky (17..=20).

use crate::tracker::TrackerError;

pub const HAND_LANDMARK_COUNT: usize = 21;
pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_FINGER_TIP: usize = 8;

/// Bone list used to draw the hand skeleton.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

/// Integer pixel position inside the current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LandmarkPoint {
    pub x: i32,
    pub y: i32,
}

impl LandmarkPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Scale a normalized `[0, 1]` coordinate to pixels (truncating), kept
    /// inside a `width` x `height` frame.
    pub fn from_normalized(x: f32, y: f32, width: i32, height: i32) -> Self {
        Self {
            x: (x * width as f32) as i32,
            y: (y * height as f32) as i32,
        }
        .clamped_to(width, height)
    }

    /// Clamp to `[0, width-1] x [0, height-1]`.
    pub fn clamped_to(self, width: i32, height: i32) -> Self {
        Self {
            x: self.x.clamp(0, (width - 1).max(0)),
            y: self.y.clamp(0, (height - 1).max(0)),
        }
    }

    pub fn distance_to(&self, other: &LandmarkPoint) -> f64 {
        let dx = other.x as f64 - self.x as f64;
        let dy = other.y as f64 - self.y as f64;
        dx.hypot(dy)
    }
}

/// One tracked hand: exactly [`HAND_LANDMARK_COUNT`] ordered points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandObservation {
    points: [LandmarkPoint; HAND_LANDMARK_COUNT],
}

impl HandObservation {
    pub fn new(points: [LandmarkPoint; HAND_LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from an arbitrary slice, rejecting anything that is not 21 points.
    pub fn from_points(points: &[LandmarkPoint]) -> Result<Self, TrackerError> {
        let points: [LandmarkPoint; HAND_LANDMARK_COUNT] =
            points
                .try_into()
                .map_err(|_| TrackerError::LandmarkCount {
                    expected: HAND_LANDMARK_COUNT,
                    actual: points.len(),
                })?;
        Ok(Self { points })
    }

    /// Build from interleaved normalized `(x, y)` pairs.
    pub fn from_normalized(xy: &[f32], width: i32, height: i32) -> Result<Self, TrackerError> {
        if xy.len() != HAND_LANDMARK_COUNT * 2 {
            return Err(TrackerError::LandmarkCount {
                expected: HAND_LANDMARK_COUNT,
                actual: xy.len() / 2,
            });
        }
        let points: Vec<LandmarkPoint> = xy
            .chunks_exact(2)
            .map(|pair| LandmarkPoint::from_normalized(pair[0], pair[1], width, height))
            .collect();
        Self::from_points(&points)
    }

    /// Every point clamped into a `width` x `height` frame.
    pub fn clamped_to(&self, width: i32, height: i32) -> Self {
        Self {
            points: self.points.map(|point| point.clamped_to(width, height)),
        }
    }

    pub fn point(&self, index: usize) -> Option<LandmarkPoint> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[LandmarkPoint] {
        &self.points
    }

    /// Thumb tip and index fingertip, the two points driving the gesture.
    pub fn pinch_pair(&self) -> Option<(LandmarkPoint, LandmarkPoint)> {
        Some((self.point(THUMB_TIP)?, self.point(INDEX_FINGER_TIP)?))
    }
}

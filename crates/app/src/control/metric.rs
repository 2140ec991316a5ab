//! Thumb/index pinch distance to volume, gesture label, and accuracy estimate.
//!
//! The open/closed threshold is deliberately independent from the volume
//! calibration domain: with the defaults the label flips at 50 px while the
//! 50 % volume point sits near 165 px.

use std::{fmt, time::Instant};

use anyhow::{Result, bail};
use ml_core::LandmarkPoint;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureLabel {
    Open,
    #[default]
    Closed,
}

impl GestureLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            GestureLabel::Open => "Open",
            GestureLabel::Closed => "Closed",
        }
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calibration constants for the pinch metric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureCalibration {
    /// Distance mapped to 0 % volume and to `accuracy_floor`.
    pub near_px: f64,
    /// Distance mapped to 100 % volume and to `accuracy_ceiling`.
    pub far_px: f64,
    /// Distances strictly above this are labelled `Open`.
    pub open_threshold_px: f64,
    pub accuracy_floor: f64,
    pub accuracy_ceiling: f64,
}

impl Default for GestureCalibration {
    fn default() -> Self {
        Self {
            near_px: 30.0,
            far_px: 300.0,
            open_threshold_px: 50.0,
            accuracy_floor: 75.0,
            accuracy_ceiling: 99.5,
        }
    }
}

impl GestureCalibration {
    pub fn validate(&self) -> Result<()> {
        if !(self.near_px.is_finite() && self.far_px.is_finite()) || self.near_px < 0.0 {
            bail!("calibration distances must be finite and non-negative");
        }
        if self.near_px >= self.far_px {
            bail!(
                "near distance ({}) must be smaller than far distance ({})",
                self.near_px,
                self.far_px
            );
        }
        if !self.open_threshold_px.is_finite() || self.open_threshold_px < 0.0 {
            bail!("open threshold must be a finite, non-negative distance");
        }
        if self.accuracy_floor > self.accuracy_ceiling {
            bail!("accuracy floor must not exceed accuracy ceiling");
        }
        Ok(())
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.near_px, self.far_px)
    }
}

/// Derived metrics for one detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct GestureSample {
    pub distance_px: f64,
    pub volume_percent: u8,
    pub gesture: GestureLabel,
    pub accuracy_percent: f64,
    pub response_time_ms: f64,
}

/// Pure pinch metric over a fixed calibration.
#[derive(Clone, Copy, Debug, Default)]
pub struct GestureMetric {
    calibration: GestureCalibration,
}

impl GestureMetric {
    pub fn new(calibration: GestureCalibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &GestureCalibration {
        &self.calibration
    }

    /// Derive a sample from the two key points.
    ///
    /// `previous` is the instant of the last derived sample; the response time
    /// is the gap between detections, not the cost of this call.
    pub fn compute(
        &self,
        thumb: LandmarkPoint,
        index: LandmarkPoint,
        previous: Option<Instant>,
        now: Instant,
    ) -> GestureSample {
        let distance_px = thumb.distance_to(&index);
        let response_time_ms = previous
            .map(|prev| round2(now.saturating_duration_since(prev).as_secs_f64() * 1000.0))
            .unwrap_or(0.0);
        self.from_distance(distance_px, response_time_ms)
    }

    pub fn from_distance(&self, distance_px: f64, response_time_ms: f64) -> GestureSample {
        let cal = &self.calibration;
        let volume = interpolate(distance_px, cal.domain(), (0.0, 100.0)).clamp(0.0, 100.0);
        let accuracy = interpolate(
            distance_px,
            cal.domain(),
            (cal.accuracy_floor, cal.accuracy_ceiling),
        );
        let gesture = if distance_px > cal.open_threshold_px {
            GestureLabel::Open
        } else {
            GestureLabel::Closed
        };

        GestureSample {
            distance_px,
            volume_percent: volume.round() as u8,
            gesture,
            accuracy_percent: round2(accuracy),
            response_time_ms,
        }
    }
}

/// Linear map from `domain` onto `range`, extrapolating outside the domain.
pub fn interpolate(value: f64, domain: (f64, f64), range: (f64, f64)) -> f64 {
    let (d0, d1) = domain;
    let (r0, r1) = range;
    if d1 == d0 {
        return r0;
    }
    r0 + (value - d0) * (r1 - r0) / (d1 - d0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn metric() -> GestureMetric {
        GestureMetric::default()
    }

    #[test]
    fn volume_saturates_outside_calibration_domain() {
        for d in [0.0, 10.0, 29.9, 30.0] {
            assert_eq!(metric().from_distance(d, 0.0).volume_percent, 0, "d={d}");
        }
        for d in [300.0, 300.1, 450.0, 10_000.0] {
            assert_eq!(metric().from_distance(d, 0.0).volume_percent, 100, "d={d}");
        }
        assert_eq!(metric().from_distance(165.0, 0.0).volume_percent, 50);
    }

    #[test]
    fn gesture_threshold_is_closed_at_exactly_fifty() {
        assert_eq!(metric().from_distance(50.0, 0.0).gesture, GestureLabel::Closed);
        assert_eq!(metric().from_distance(50.01, 0.0).gesture, GestureLabel::Open);
        assert_eq!(metric().from_distance(0.0, 0.0).gesture, GestureLabel::Closed);
        assert_eq!(metric().from_distance(120.0, 0.0).gesture, GestureLabel::Open);
    }

    #[test]
    fn accuracy_is_monotonic_over_domain() {
        let mut last = f64::MIN;
        for d in 30..=300 {
            let acc = metric().from_distance(d as f64, 0.0).accuracy_percent;
            assert!(acc >= last, "accuracy decreased at {d}");
            last = acc;
        }
        assert_eq!(metric().from_distance(30.0, 0.0).accuracy_percent, 75.0);
        assert_eq!(metric().from_distance(300.0, 0.0).accuracy_percent, 99.5);
    }

    #[test]
    fn accuracy_extrapolates_beyond_domain() {
        assert!(metric().from_distance(0.0, 0.0).accuracy_percent < 75.0);
        assert!(metric().from_distance(400.0, 0.0).accuracy_percent > 99.5);
    }

    #[test]
    fn closed_pinch_scenario() {
        let now = Instant::now();
        let sample = metric().compute(
            LandmarkPoint::new(100, 100),
            LandmarkPoint::new(100, 130),
            None,
            now,
        );
        assert_eq!(sample.distance_px, 30.0);
        assert_eq!(sample.volume_percent, 0);
        assert_eq!(sample.gesture, GestureLabel::Closed);
        assert_eq!(sample.accuracy_percent, 75.0);
        assert_eq!(sample.response_time_ms, 0.0);
    }

    #[test]
    fn wide_open_scenario() {
        let sample = metric().compute(
            LandmarkPoint::new(0, 0),
            LandmarkPoint::new(300, 0),
            None,
            Instant::now(),
        );
        assert_eq!(sample.distance_px, 300.0);
        assert_eq!(sample.volume_percent, 100);
        assert_eq!(sample.gesture, GestureLabel::Open);
        assert_eq!(sample.accuracy_percent, 99.5);
    }

    #[test]
    fn response_time_measures_gap_between_samples() {
        let first_at = Instant::now();
        let second_at = first_at + Duration::from_millis(40);
        let first = metric().compute(
            LandmarkPoint::new(0, 0),
            LandmarkPoint::new(100, 0),
            None,
            first_at,
        );
        let second = metric().compute(
            LandmarkPoint::new(0, 0),
            LandmarkPoint::new(250, 0),
            Some(first_at),
            second_at,
        );
        assert_eq!(first.response_time_ms, 0.0);
        assert!((second.response_time_ms - 40.0).abs() < 0.01);
    }

    #[test]
    fn custom_calibration_moves_both_constants_independently() {
        let metric = GestureMetric::new(GestureCalibration {
            near_px: 20.0,
            far_px: 220.0,
            open_threshold_px: 80.0,
            ..GestureCalibration::default()
        });
        let sample = metric.from_distance(120.0, 0.0);
        assert_eq!(sample.volume_percent, 50);
        assert_eq!(sample.gesture, GestureLabel::Open);
        assert_eq!(metric.from_distance(80.0, 0.0).gesture, GestureLabel::Closed);
    }

    #[test]
    fn degenerate_calibration_is_rejected() {
        let cal = GestureCalibration {
            near_px: 300.0,
            far_px: 30.0,
            ..GestureCalibration::default()
        };
        assert!(cal.validate().is_err());
        assert!(GestureCalibration::default().validate().is_ok());
    }
}

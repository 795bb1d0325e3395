//! Rim speed estimation from consecutive angle measurements.

use std::collections::VecDeque;
use std::time::Instant;

use crate::angle::Angle;

/// Number of raw speed samples the rolling window holds.
const WINDOW: usize = 10;

/// Differentiates consecutive angle readings along the shortest path and
/// smooths the result with a rolling mean over the last raw speeds.
pub struct SpeedEstimator {
    radius: f64,
    window: VecDeque<f64>,
    last: Option<(Angle, Instant)>,
}

impl SpeedEstimator {
    /// Creates an estimator for a stage of the given diameter (meters).
    pub fn new(stage_diameter: f64) -> Self {
        Self {
            radius: stage_diameter / 2.0,
            window: VecDeque::with_capacity(WINDOW),
            last: None,
        }
    }
    /// Feeds one angle measurement; returns the smoothed rim speed in m/s
    /// once at least two measurements have been seen.
    pub fn update(&mut self, angle: Angle, at: Instant) -> Option<f64> {
        let Some((last_angle, last_at)) = self.last else {
            self.last = Some((angle, at));
            return None;
        };
        let dt = at.saturating_duration_since(last_at).as_secs_f64();
        if dt <= 0.0 {
            return None;
        }
        let arc = last_angle.delta(angle).to_radians() * self.radius;
        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(arc / dt);
        self.last = Some((angle, at));
        let sum: f64 = self.window.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        Some(sum / self.window.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn constant_rotation_yields_constant_speed() {
        // diameter 4.5 m, 10°/100 ms ≈ 3.93 m/s at the rim
        let mut est = SpeedEstimator::new(4.5);
        let t0 = Instant::now();
        assert!(est.update(Angle::new(0.0), t0).is_none());
        let expected = 10.0_f64.to_radians() * 2.25 / 0.1;
        for i in 1..=20u64 {
            let speed = est
                .update(
                    Angle::new(10.0 * i as f64),
                    t0 + Duration::from_millis(100 * i),
                )
                .unwrap();
            assert!((speed - expected).abs() < 1e-6, "step {i}: {speed}");
        }
    }

    #[test]
    fn speed_crosses_the_wrap_seam() {
        let mut est = SpeedEstimator::new(4.5);
        let t0 = Instant::now();
        est.update(Angle::new(355.0), t0);
        let speed = est
            .update(Angle::new(5.0), t0 + Duration::from_millis(100))
            .unwrap();
        // shortest path is 10°, not 350°
        let expected = 10.0_f64.to_radians() * 2.25 / 0.1;
        assert!((speed - expected).abs() < 1e-6, "{speed}");
    }

    #[test]
    fn window_smooths_outliers() {
        let mut est = SpeedEstimator::new(4.5);
        let t0 = Instant::now();
        est.update(Angle::new(0.0), t0);
        let mut angle = 0.0;
        let mut last = 0.0;
        for i in 1..=9u64 {
            angle += 10.0;
            last = est
                .update(Angle::new(angle), t0 + Duration::from_millis(100 * i))
                .unwrap();
        }
        // one stalled reading drags the mean down, but only by ~1/10th
        let dropped = est
            .update(Angle::new(angle), t0 + Duration::from_millis(1000))
            .unwrap();
        assert!(dropped < last);
        assert!(dropped > last * 0.8);
    }

    #[test]
    fn zero_dt_is_ignored() {
        let mut est = SpeedEstimator::new(4.5);
        let t0 = Instant::now();
        est.update(Angle::new(0.0), t0);
        assert!(est.update(Angle::new(10.0), t0).is_none());
    }
}

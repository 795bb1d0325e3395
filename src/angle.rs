//! Angle arithmetic on the ring ℤ/360°.
//!
//! Every [`Angle`] is normalized to `[0, 360)` on construction; all
//! operations stay on the ring. Averaging two or more angles MUST go through
//! [`angle_avg`] (circular mean) — a plain arithmetic mean is wrong across
//! the 0/360 seam.

use std::fmt;
use std::ops::{Add, Sub};

use crate::command::Direction;

/// An absolute stage angle, normalized to `[0, 360)` degrees.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Angle(f64);

impl Angle {
    /// Creates an angle from any real number of degrees, wrapping into
    /// `[0, 360)` (negative inputs included).
    pub fn new(degrees: f64) -> Self {
        Self(degrees.rem_euclid(360.0))
    }
    /// The normalized value in degrees.
    pub fn degrees(self) -> f64 {
        self.0
    }
    /// The normalized value in radians.
    pub fn radians(self) -> f64 {
        self.0.to_radians()
    }
    /// Shortest-path (undirected) distance to `other`, in `[0, 180]`.
    pub fn delta(self, other: Angle) -> f64 {
        let diff = (self.0 - other.0).abs();
        if diff > 180.0 {
            360.0 - diff
        } else {
            diff
        }
    }
    /// Directed sweep distance from `self` to `target` along `direction`,
    /// in `[0, 360)`. Zero if the angles coincide.
    pub fn sweep_to(self, target: Angle, direction: Direction) -> f64 {
        match direction {
            Direction::Clockwise => (target.0 - self.0).rem_euclid(360.0),
            Direction::Counterclockwise => (self.0 - target.0).rem_euclid(360.0),
        }
    }
}

impl From<f64> for Angle {
    fn from(degrees: f64) -> Self {
        Self::new(degrees)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}°", self.0)
    }
}

impl Add<f64> for Angle {
    type Output = Angle;
    fn add(self, rhs: f64) -> Angle {
        Angle::new(self.0 + rhs)
    }
}

impl Sub<f64> for Angle {
    type Output = Angle;
    fn sub(self, rhs: f64) -> Angle {
        Angle::new(self.0 - rhs)
    }
}

impl Add for Angle {
    type Output = Angle;
    fn add(self, rhs: Angle) -> Angle {
        Angle::new(self.0 + rhs.0)
    }
}

impl Sub for Angle {
    type Output = Angle;
    fn sub(self, rhs: Angle) -> Angle {
        Angle::new(self.0 - rhs.0)
    }
}

/// Circular mean of a set of angles: `atan2(Σ sin, Σ cos)`, renormalized.
///
/// Returns `None` for an empty slice.
pub fn angle_avg(angles: &[Angle]) -> Option<Angle> {
    if angles.is_empty() {
        return None;
    }
    let (mut x, mut y) = (0.0, 0.0);
    for a in angles {
        x += a.radians().cos();
        y += a.radians().sin();
    }
    Some(Angle::new(y.atan2(x).to_degrees()))
}

/// Circular median: the middle angle of the sorted set, or the circular mean
/// of the two middle angles when the count is even.
///
/// Returns `None` for an empty slice.
pub fn angle_median(angles: &[Angle]) -> Option<Angle> {
    if angles.is_empty() {
        return None;
    }
    let mut sorted = angles.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        angle_avg(&sorted[n / 2 - 1..=n / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Direction;

    #[test]
    fn normalization_wraps_multiples_of_full_turns() {
        for k in -3i32..=3 {
            let x = 137.5;
            assert_eq!(Angle::new(x + 360.0 * f64::from(k)), Angle::new(x));
        }
        assert_eq!(Angle::new(-10.0), Angle::new(350.0));
        assert_eq!(Angle::new(360.0).degrees(), 0.0);
    }

    #[test]
    fn delta_is_symmetric_and_bounded() {
        let cases = [(0.0, 350.0, 10.0), (10.0, 200.0, 170.0), (90.0, 270.0, 180.0)];
        for (a, b, expected) in cases {
            let a = Angle::new(a);
            let b = Angle::new(b);
            assert!((a.delta(b) - expected).abs() < 1e-9);
            assert!((a.delta(b) - b.delta(a)).abs() < 1e-9);
            assert!(a.delta(b) >= 0.0 && a.delta(b) <= 180.0);
        }
    }

    #[test]
    fn add_sub_stay_on_ring() {
        assert_eq!(Angle::new(350.0) + 20.0, Angle::new(10.0));
        assert_eq!(Angle::new(10.0) - 20.0, Angle::new(350.0));
        assert_eq!(Angle::new(180.0) + Angle::new(270.0), Angle::new(90.0));
    }

    #[test]
    fn directed_sweeps_complement_to_full_turn() {
        let pairs = [(10.0, 350.0), (20.0, 170.0), (300.0, 10.0)];
        for (cur, target) in pairs {
            let cur = Angle::new(cur);
            let target = Angle::new(target);
            let cw = cur.sweep_to(target, Direction::Clockwise);
            let ccw = cur.sweep_to(target, Direction::Counterclockwise);
            assert!((cw + ccw - 360.0).abs() < 1e-9, "cw={cw} ccw={ccw}");
        }
        let a = Angle::new(42.0);
        assert_eq!(a.sweep_to(a, Direction::Clockwise), 0.0);
    }

    #[test]
    fn sweep_wraps_across_zero() {
        // 10° → 350° counter-clockwise is 20°, not 340°
        let cur = Angle::new(10.0);
        let target = Angle::new(350.0);
        assert!((cur.sweep_to(target, Direction::Counterclockwise) - 20.0).abs() < 1e-9);
        assert!((cur.sweep_to(target, Direction::Clockwise) - 340.0).abs() < 1e-9);
    }

    #[test]
    fn circular_mean_crosses_the_seam() {
        let avg = angle_avg(&[Angle::new(350.0), Angle::new(10.0)]).unwrap();
        assert!(avg.delta(Angle::new(0.0)) < 1e-9, "got {avg}");
        let avg = angle_avg(&[Angle::new(90.0), Angle::new(180.0)]).unwrap();
        assert!(avg.delta(Angle::new(135.0)) < 1e-9);
        assert!(angle_avg(&[]).is_none());
    }

    #[test]
    fn median_picks_middle_or_mean_of_middles() {
        let odd = [Angle::new(10.0), Angle::new(20.0), Angle::new(200.0)];
        assert_eq!(angle_median(&odd), Some(Angle::new(20.0)));
        let even = [Angle::new(10.0), Angle::new(20.0)];
        assert!(angle_median(&even).unwrap().delta(Angle::new(15.0)) < 1e-9);
        assert!(angle_median(&[]).is_none());
    }
}

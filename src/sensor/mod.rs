//! Sensor readings and sensor-side data types.

use crate::angle::Angle;

pub mod rotation;
pub mod speed;

/// What a reading measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// Absolute stage angle, degrees in `[0, 360)`
    AbsoluteAngle,
    /// Rim speed, meters per second
    Speed,
}

/// One measurement. Readings of one sensor iteration are sent to the
/// control worker as a single batch so they are applied atomically.
#[derive(Debug, Clone, Copy)]
pub struct Reading {
    pub kind: SensorKind,
    pub value: f64,
}

impl Reading {
    /// An absolute-angle reading
    pub fn angle(angle: Angle) -> Self {
        Self {
            kind: SensorKind::AbsoluteAngle,
            value: angle.degrees(),
        }
    }
    /// A rim-speed reading
    pub fn speed(value: f64) -> Self {
        Self {
            kind: SensorKind::Speed,
            value,
        }
    }
}

/// Drive state fed back from the control worker to the simulated rotation
/// sensor in `--testing` runs, closing the simulation loop.
#[derive(Debug, Clone, Copy)]
pub struct DriveFeedback {
    /// Motor direction
    pub forward: bool,
    /// Current output frequency, Hz
    pub frequency: f64,
}

//! Operator commands for the stage.

use crate::angle::Angle;

/// Rotation direction as seen from the audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Positive (forward) rotation
    Clockwise,
    /// Negative (reverse) rotation
    Counterclockwise,
}

impl Direction {
    /// True for [`Direction::Clockwise`]
    pub fn is_clockwise(self) -> bool {
        matches!(self, Direction::Clockwise)
    }
    /// The opposite direction
    pub fn reversed(self) -> Self {
        match self {
            Direction::Clockwise => Direction::Counterclockwise,
            Direction::Counterclockwise => Direction::Clockwise,
        }
    }
}

/// An operator intent, produced by the view worker and consumed by the
/// control worker.
///
/// Payload invariants hold by construction: run variants always carry a
/// direction, `RunToAngle` a (normalized) target angle, `Remote` a frequency
/// scale. Equality is the derived structural one — any two `Stop`s compare
/// equal, run commands compare their full payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Decelerate and stop the stage
    Stop,
    /// Stop the motor immediately, bypassing the ramp
    EmergencyStop,
    /// Rotate continuously at the given rim speed (m/s)
    RunContinuous { direction: Direction, speed: f64 },
    /// Rotate to the target angle along the given direction
    RunToAngle {
        direction: Direction,
        speed: f64,
        angle: Angle,
    },
    /// Frequency pass-through: `frequency` is normalized to `[0, 1]` and
    /// scaled by the converter's maximum downstream
    Remote { direction: Direction, frequency: f64 },
}

impl Command {
    /// True for the variants that make the stage move
    pub fn is_run(&self) -> bool {
        matches!(
            self,
            Command::RunContinuous { .. } | Command::RunToAngle { .. } | Command::Remote { .. }
        )
    }
    /// True for [`Command::Stop`] and [`Command::EmergencyStop`]
    pub fn is_stop(&self) -> bool {
        matches!(self, Command::Stop | Command::EmergencyStop)
    }
    /// The commanded direction, if the variant carries one
    pub fn direction(&self) -> Option<Direction> {
        match self {
            Command::RunContinuous { direction, .. }
            | Command::RunToAngle { direction, .. }
            | Command::Remote { direction, .. } => Some(*direction),
            Command::Stop | Command::EmergencyStop => None,
        }
    }
    /// The commanded rim speed, if the variant carries one
    pub fn speed(&self) -> Option<f64> {
        match self {
            Command::RunContinuous { speed, .. } | Command::RunToAngle { speed, .. } => {
                Some(*speed)
            }
            _ => None,
        }
    }
    /// True if the command turns the stage clockwise (false for commands
    /// without a direction)
    pub fn turns_clockwise(&self) -> bool {
        self.direction().map_or(false, Direction::is_clockwise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_are_always_equal() {
        assert_eq!(Command::Stop, Command::Stop);
        assert_eq!(Command::EmergencyStop, Command::EmergencyStop);
        assert_ne!(Command::Stop, Command::EmergencyStop);
    }

    #[test]
    fn run_commands_compare_their_payload() {
        let a = Command::RunToAngle {
            direction: Direction::Clockwise,
            speed: 1.0,
            angle: Angle::new(170.0),
        };
        let b = a.clone();
        assert_eq!(a, b);
        let c = Command::RunToAngle {
            direction: Direction::Clockwise,
            speed: 1.0,
            angle: Angle::new(171.0),
        };
        assert_ne!(a, c);
        let d = Command::RunContinuous {
            direction: Direction::Clockwise,
            speed: 1.0,
        };
        let e = Command::RunContinuous {
            direction: Direction::Counterclockwise,
            speed: 1.0,
        };
        assert_ne!(d, e);
    }

    #[test]
    fn classification() {
        assert!(Command::Stop.is_stop());
        assert!(!Command::Stop.is_run());
        let run = Command::RunContinuous {
            direction: Direction::Counterclockwise,
            speed: 0.4,
        };
        assert!(run.is_run());
        assert_eq!(run.direction(), Some(Direction::Counterclockwise));
        assert!(!run.turns_clockwise());
        assert_eq!(run.speed(), Some(0.4));
        assert_eq!(Command::Stop.direction(), None);
    }
}

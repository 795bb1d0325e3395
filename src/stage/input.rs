//! Operator input state and the OSC address map.
//!
//! The view worker feeds decoded OSC messages into [`InputState`]; whenever
//! the state reconstructs to a different [`Command`] than the last one sent,
//! the delta goes to the control worker. Malformed messages (wrong arity,
//! type or range) are dropped with a debug log and leave the state as is.

use rosc::{OscMessage, OscType};
use tracing::debug;

use crate::angle::Angle;
use crate::command::{Command, Direction};

/// The operator intent reconstructed from the OSC stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Stop,
    EmergencyStop,
    RunContinuous,
    RunToAngle,
    Remote,
}

/// Mutable operator input state.
pub struct InputState {
    action: Action,
    /// Mode pre-selected via `/mode`, latched by a bare `/run`
    armed_mode: Action,
    direction: Direction,
    speed: f64,
    angle: f64,
    frequency: f64,
    max_speed: f64,
}

impl InputState {
    /// Creates the boot state: stopped, clockwise, full speed.
    /// `max_speed` bounds `/speed` arguments.
    pub fn new(max_speed: f64) -> Self {
        Self {
            action: Action::Stop,
            armed_mode: Action::Stop,
            direction: Direction::Clockwise,
            speed: 1.0,
            angle: 0.0,
            frequency: 0.0,
            max_speed,
        }
    }

    /// The command the current state describes.
    pub fn command(&self) -> Command {
        match self.action {
            Action::Stop => Command::Stop,
            Action::EmergencyStop => Command::EmergencyStop,
            Action::RunContinuous => Command::RunContinuous {
                direction: self.direction,
                speed: self.speed,
            },
            Action::RunToAngle => Command::RunToAngle {
                direction: self.direction,
                speed: self.speed,
                angle: Angle::new(self.angle),
            },
            Action::Remote => Command::Remote {
                direction: self.direction,
                frequency: self.frequency,
            },
        }
    }

    /// Applies one OSC message to the state.
    pub fn apply(&mut self, msg: &OscMessage) {
        match msg.addr.as_str() {
            "/stop" => {
                self.action = Action::Stop;
                debug!("osc: stop");
            }
            "/emergencystop" => {
                self.action = Action::EmergencyStop;
                debug!("osc: emergency stop");
            }
            "/run" => {
                self.action = self.armed_mode;
                debug!(mode = ?self.armed_mode, "osc: run");
            }
            "/run/continuous" => {
                self.action = Action::RunContinuous;
                self.armed_mode = Action::RunContinuous;
                debug!("osc: run continuous");
            }
            "/run/to_angle" => {
                self.action = Action::RunToAngle;
                self.armed_mode = Action::RunToAngle;
                debug!("osc: run to angle");
            }
            "/mode" => self.apply_mode(msg),
            "/speed" => self.apply_speed(msg),
            "/direction" => self.apply_direction(msg),
            "/angle" => self.apply_angle(msg),
            "/remote" => self.apply_remote(msg),
            other => debug!(addr = other, "osc: unknown address"),
        }
    }

    fn apply_mode(&mut self, msg: &OscMessage) {
        let [OscType::String(mode)] = msg.args.as_slice() else {
            debug!(?msg.args, "osc: invalid mode arguments");
            return;
        };
        self.armed_mode = match mode.as_str() {
            "stop" => Action::Stop,
            "continuous" => Action::RunContinuous,
            "to_angle" => Action::RunToAngle,
            "remote" => Action::Remote,
            other => {
                debug!(mode = other, "osc: invalid mode");
                return;
            }
        };
        debug!(mode = ?self.armed_mode, "osc: mode armed");
    }

    fn apply_speed(&mut self, msg: &OscMessage) {
        let Some(speed) = single_float(msg) else {
            debug!(?msg.args, "osc: invalid speed arguments");
            return;
        };
        if !(0.0..=self.max_speed).contains(&speed) {
            debug!(speed, "osc: speed out of range");
            return;
        }
        self.speed = speed;
        debug!(speed, "osc: speed");
    }

    fn apply_direction(&mut self, msg: &OscMessage) {
        let [OscType::String(direction)] = msg.args.as_slice() else {
            debug!(?msg.args, "osc: invalid direction arguments");
            return;
        };
        self.direction = match direction.to_lowercase().as_str() {
            "clockwise" => Direction::Clockwise,
            "counterclockwise" => Direction::Counterclockwise,
            other => {
                debug!(direction = other, "osc: invalid direction");
                return;
            }
        };
        debug!(direction = ?self.direction, "osc: direction");
    }

    fn apply_angle(&mut self, msg: &OscMessage) {
        let Some(angle) = single_float(msg) else {
            debug!(?msg.args, "osc: invalid angle arguments");
            return;
        };
        if !(0.0..360.0).contains(&angle) {
            debug!(angle, "osc: angle out of range");
            return;
        }
        self.angle = angle;
        debug!(angle, "osc: angle");
    }

    fn apply_remote(&mut self, msg: &OscMessage) {
        if msg.args.len() != 2 {
            debug!(?msg.args, "osc: invalid remote arity");
            return;
        }
        let direction = match &msg.args[0] {
            OscType::Int(v) => *v,
            #[allow(clippy::cast_possible_truncation)]
            OscType::Float(v) => v.round() as i32,
            _ => {
                debug!(?msg.args, "osc: invalid remote direction argument");
                return;
            }
        };
        if direction != 0 && direction != 1 {
            debug!(direction, "osc: invalid remote direction");
            return;
        }
        let frequency = match &msg.args[1] {
            OscType::Float(v) => f64::from(*v),
            OscType::Double(v) => *v,
            _ => {
                debug!(?msg.args, "osc: invalid remote frequency argument");
                return;
            }
        };
        if !(0.0..=1.0).contains(&frequency) {
            debug!(frequency, "osc: remote frequency out of range");
            return;
        }
        if frequency == 0.0 {
            // a zero pass-through is just a stop
            self.action = Action::Stop;
        } else {
            self.action = Action::Remote;
            self.frequency = frequency;
            self.direction = if direction == 1 {
                Direction::Clockwise
            } else {
                Direction::Counterclockwise
            };
        }
        debug!(direction, frequency, "osc: remote");
    }
}

fn single_float(msg: &OscMessage) -> Option<f64> {
    if msg.args.len() != 1 {
        return None;
    }
    match &msg.args[0] {
        OscType::Float(v) => Some(f64::from(*v)),
        OscType::Double(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_owned(),
            args,
        }
    }

    #[test]
    fn boot_state_is_stop() {
        let state = InputState::new(1.0);
        assert_eq!(state.command(), Command::Stop);
    }

    #[test]
    fn run_to_angle_round_trip() {
        let mut state = InputState::new(1.0);
        state.apply(&msg("/direction", vec![OscType::String("clockwise".into())]));
        state.apply(&msg("/speed", vec![OscType::Float(0.4)]));
        state.apply(&msg("/angle", vec![OscType::Float(137.0)]));
        state.apply(&msg("/run/to_angle", vec![]));
        let Command::RunToAngle {
            direction,
            speed,
            angle,
        } = state.command()
        else {
            panic!("expected RunToAngle, got {:?}", state.command());
        };
        assert_eq!(direction, Direction::Clockwise);
        assert!((speed - 0.4).abs() < 1e-6);
        assert!(angle.delta(Angle::new(137.0)) < 1e-6);
    }

    #[test]
    fn bare_run_latches_the_armed_mode() {
        let mut state = InputState::new(1.0);
        state.apply(&msg("/mode", vec![OscType::String("continuous".into())]));
        // arming alone does not start anything
        assert_eq!(state.command(), Command::Stop);
        state.apply(&msg("/run", vec![]));
        assert!(matches!(state.command(), Command::RunContinuous { .. }));
    }

    #[test]
    fn malformed_updates_are_dropped() {
        let mut state = InputState::new(1.0);
        state.apply(&msg("/speed", vec![OscType::String("fast".into())]));
        state.apply(&msg("/speed", vec![OscType::Float(3.5)])); // above max_speed
        state.apply(&msg("/angle", vec![OscType::Float(400.0)]));
        state.apply(&msg("/direction", vec![OscType::String("up".into())]));
        state.apply(&msg("/run/to_angle", vec![]));
        let Command::RunToAngle {
            direction,
            speed,
            angle,
        } = state.command()
        else {
            panic!("expected RunToAngle");
        };
        assert_eq!(direction, Direction::Clockwise);
        assert!((speed - 1.0).abs() < 1e-9);
        assert!(angle.delta(Angle::new(0.0)) < 1e-9);
    }

    #[test]
    fn remote_zero_collapses_to_stop() {
        let mut state = InputState::new(1.0);
        state.apply(&msg(
            "/remote",
            vec![OscType::Int(1), OscType::Float(0.5)],
        ));
        assert_eq!(
            state.command(),
            Command::Remote {
                direction: Direction::Clockwise,
                frequency: 0.5,
            }
        );
        state.apply(&msg(
            "/remote",
            vec![OscType::Int(1), OscType::Float(0.0)],
        ));
        assert_eq!(state.command(), Command::Stop);
    }

    #[test]
    fn remote_direction_zero_is_counterclockwise() {
        let mut state = InputState::new(1.0);
        state.apply(&msg(
            "/remote",
            vec![OscType::Int(0), OscType::Float(0.25)],
        ));
        let Command::Remote { direction, .. } = state.command() else {
            panic!("expected Remote");
        };
        assert_eq!(direction, Direction::Counterclockwise);
    }

    #[test]
    fn emergency_stop_wins_immediately() {
        let mut state = InputState::new(1.0);
        state.apply(&msg("/run/continuous", vec![]));
        state.apply(&msg("/emergencystop", vec![]));
        assert_eq!(state.command(), Command::EmergencyStop);
    }
}

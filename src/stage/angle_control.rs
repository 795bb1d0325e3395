//! Outer loop of the cascade: angle → speed.

use std::time::{Duration, Instant};

use crate::angle::Angle;
use crate::command::Direction;
use crate::pid::Pid;

/// Sample time of the angle loop
const SAMPLE_TIME: Duration = Duration::from_millis(100);

/// Drives the stage toward a target angle along a chosen direction.
///
/// The controlled quantity is the *accumulated sweep*: the directed angular
/// distance traveled since the setpoint was armed, wrap-aware on the 360°
/// ring. The PID setpoint is the total sweep to cover, so the control speed
/// goes to zero as the stage arrives.
pub struct StageAngleController {
    pid: Pid,
    engaged: bool,
    direction: Direction,
    sweep_setpoint: f64,
    accumulated_sweep: f64,
    last_angle: Option<Angle>,
    control_speed: Option<f64>,
}

impl StageAngleController {
    /// Creates a disengaged controller with the given gains.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            pid: Pid::new(kp, ki, kd).with_sample_time(SAMPLE_TIME),
            engaged: false,
            direction: Direction::Clockwise,
            sweep_setpoint: 0.0,
            accumulated_sweep: 0.0,
            last_angle: None,
            control_speed: None,
        }
    }

    /// Arms the controller: compute the directed sweep from the current
    /// measured angle to `target`, reset the accumulator and re-arm the PID
    /// with the last control speed as seed, limited to `±speed_cap` m/s.
    ///
    /// Fails (returns `false`) until an angle measurement has been seen.
    pub fn set_setpoint(&mut self, target: Angle, speed_cap: f64, direction: Direction) -> bool {
        let Some(current) = self.last_angle else {
            return false;
        };
        let sweep = current.sweep_to(target, direction);
        self.pid.set_auto_mode(false, None);
        self.pid.set_setpoint(sweep);
        self.pid.set_output_limits(-speed_cap, speed_cap);
        self.pid.set_auto_mode(true, self.control_speed);
        self.sweep_setpoint = sweep;
        self.accumulated_sweep = 0.0;
        self.direction = direction;
        self.engaged = true;
        true
    }

    /// Stops sweep accumulation; the last measured angle keeps updating.
    pub fn disengage(&mut self) {
        self.engaged = false;
    }

    /// Feeds one angle measurement. While engaged, the directed increment
    /// from the previous measurement is added to the accumulator (modulo
    /// 360) and a new control speed is computed.
    pub fn set_measurement(&mut self, angle: Angle, now: Instant) {
        if self.engaged {
            if let Some(prev) = self.last_angle {
                self.accumulated_sweep =
                    (self.accumulated_sweep + prev.sweep_to(angle, self.direction)).rem_euclid(360.0);
            }
            self.control_speed = self.pid.update_at(self.accumulated_sweep, now);
        }
        self.last_angle = Some(angle);
    }

    /// The speed the stage should run at, m/s, signed (negative means the
    /// stage overshot and must back up)
    pub fn control_speed(&self) -> Option<f64> {
        self.control_speed
    }
    /// Last measured stage angle
    pub fn last_angle(&self) -> Option<Angle> {
        self.last_angle
    }
    /// Total sweep to cover for the current setpoint, degrees
    pub fn sweep_setpoint(&self) -> f64 {
        self.sweep_setpoint
    }
    /// Directed distance traveled since the setpoint was armed, degrees
    pub fn accumulated_sweep(&self) -> f64 {
        self.accumulated_sweep
    }
    /// True while a run-to-angle setpoint is armed
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn step(i: u64) -> Duration {
        Duration::from_millis(100 * i)
    }

    #[test]
    fn setpoint_needs_a_measurement_first() {
        let mut ctl = StageAngleController::new(2.0, 0.0, 0.0);
        assert!(!ctl.set_setpoint(Angle::new(170.0), 1.0, Direction::Clockwise));
        ctl.set_measurement(Angle::new(20.0), Instant::now());
        assert!(ctl.set_setpoint(Angle::new(170.0), 1.0, Direction::Clockwise));
        assert!((ctl.sweep_setpoint() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn counterclockwise_sweep_wraps() {
        let mut ctl = StageAngleController::new(2.0, 0.0, 0.0);
        ctl.set_measurement(Angle::new(10.0), Instant::now());
        assert!(ctl.set_setpoint(Angle::new(350.0), 1.0, Direction::Counterclockwise));
        assert!((ctl.sweep_setpoint() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn sweep_accumulates_monotonically_and_speed_decays() {
        let mut ctl = StageAngleController::new(2.0, 0.0, 0.0);
        let t0 = Instant::now();
        ctl.set_measurement(Angle::new(20.0), t0);
        assert!(ctl.set_setpoint(Angle::new(170.0), 1.0, Direction::Clockwise));
        let mut last_sweep = 0.0;
        for i in 1..=15u64 {
            ctl.set_measurement(Angle::new(20.0 + 10.0 * i as f64), t0 + step(i));
            assert!(ctl.accumulated_sweep() >= last_sweep);
            last_sweep = ctl.accumulated_sweep();
        }
        assert!((last_sweep - 150.0).abs() < 1e-9);
        // at the target the proportional output is zero
        assert!(ctl.control_speed().unwrap().abs() < 1e-9);
    }

    #[test]
    fn speed_is_capped_by_the_command() {
        let mut ctl = StageAngleController::new(2.0, 0.0, 0.0);
        let t0 = Instant::now();
        ctl.set_measurement(Angle::new(0.0), t0);
        ctl.set_setpoint(Angle::new(180.0), 0.4, Direction::Clockwise);
        ctl.set_measurement(Angle::new(10.0), t0 + step(1));
        // error is huge, so the output sits at the cap
        assert!((ctl.control_speed().unwrap() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn accumulation_crosses_zero_in_clockwise_runs() {
        let mut ctl = StageAngleController::new(2.0, 0.0, 0.0);
        let t0 = Instant::now();
        ctl.set_measurement(Angle::new(350.0), t0);
        ctl.set_setpoint(Angle::new(20.0), 1.0, Direction::Clockwise);
        assert!((ctl.sweep_setpoint() - 30.0).abs() < 1e-9);
        ctl.set_measurement(Angle::new(355.0), t0 + step(1));
        ctl.set_measurement(Angle::new(5.0), t0 + step(2));
        assert!((ctl.accumulated_sweep() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn disengaged_controller_only_tracks_the_angle() {
        let mut ctl = StageAngleController::new(2.0, 0.0, 0.0);
        let t0 = Instant::now();
        ctl.set_measurement(Angle::new(0.0), t0);
        ctl.set_setpoint(Angle::new(90.0), 1.0, Direction::Clockwise);
        ctl.disengage();
        ctl.set_measurement(Angle::new(45.0), t0 + step(1));
        assert_eq!(ctl.accumulated_sweep(), 0.0);
        assert_eq!(ctl.last_angle(), Some(Angle::new(45.0)));
    }
}

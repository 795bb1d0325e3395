//! Inner loop of the cascade: speed → frequency.

use std::time::{Duration, Instant};

use crate::pid::Pid;

/// Sample time of the speed loop
const SAMPLE_TIME: Duration = Duration::from_millis(50);

/// Turns a rim-speed setpoint (m/s) into a drive frequency (Hz).
///
/// The m/s → Hz unit conversion lives in the PID gains: with the default
/// `kp = 10` a speed error of 1 m/s asks for 10 Hz.
pub struct StageSpeedController {
    pid: Pid,
    setpoint_active: bool,
    measured: Option<f64>,
    control_frequency: Option<f64>,
}

impl StageSpeedController {
    /// Creates a controller with the given gains; the output is clamped to
    /// `[0, max_frequency]` Hz.
    pub fn new(kp: f64, ki: f64, kd: f64, max_frequency: f64) -> Self {
        Self {
            pid: Pid::new(kp, ki, kd)
                .with_sample_time(SAMPLE_TIME)
                .with_output_limits(0.0, max_frequency),
            setpoint_active: false,
            measured: None,
            control_frequency: None,
        }
    }

    /// Sets the speed setpoint in m/s. Fails (returns `false`) until a
    /// speed measurement has been seen.
    pub fn set_setpoint(&mut self, speed: f64) -> bool {
        if self.measured.is_none() {
            return false;
        }
        self.pid.set_setpoint(speed);
        self.setpoint_active = true;
        true
    }

    /// Drops the setpoint and the computed frequency; the controller stays
    /// quiet until the next `set_setpoint`.
    pub fn clear_setpoint(&mut self) {
        self.setpoint_active = false;
        self.control_frequency = None;
    }

    /// Feeds one speed measurement; with an active setpoint a new control
    /// frequency is computed.
    pub fn set_measurement(&mut self, speed: f64, now: Instant) {
        if self.setpoint_active {
            self.control_frequency = self.pid.update_at(speed, now);
        }
        self.measured = Some(speed);
    }

    /// The frequency the drive should run at, Hz
    pub fn control_frequency(&self) -> Option<f64> {
        self.control_frequency
    }
    /// Last measured rim speed, m/s
    pub fn measured_speed(&self) -> Option<f64> {
        self.measured
    }
    /// Current setpoint in m/s, if armed
    pub fn setpoint(&self) -> Option<f64> {
        self.setpoint_active.then(|| self.pid.setpoint())
    }
}

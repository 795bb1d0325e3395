//! Per-tick stage control: reading dispatch, measurement watchdog, command
//! handling and the motor state machine.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::angle::Angle;
use crate::command::Command;
use crate::motor::FrequencyConverter;
use crate::sensor::{Reading, SensorKind};
use crate::stage::{StageAngleController, StageSpeedController};
use crate::Result;

/// Below this commanded frequency the motor is stopped instead of crawling
/// (crossover deadband).
const STOP_DEADBAND_HZ: f64 = 1.0;
/// Minimum interval between target-frequency writes; protects the serial
/// bus from saturation.
const TARGET_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Motor drive state as the controller believes it to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    /// Stopped via the regular ramp (or never started)
    Idle,
    /// Running clockwise
    RunningForward,
    /// Running counter-clockwise
    RunningReverse,
    /// Emergency-stopped; a new run command is required to resume
    EmergencyStopped,
}

/// Tunables for [`StageControl`], resolved from the config store by the
/// control worker.
#[derive(Debug, Clone, Copy)]
pub struct StageControlSettings {
    /// Converter frequency ceiling, Hz
    pub max_frequency: f64,
    /// Floor for rate-limited target updates, Hz (sub-resolution writes are
    /// skipped)
    pub min_target_frequency: f64,
    /// Graceful-stop rollout distance per m/s of commanded speed, degrees
    pub stop_angle: f64,
    /// Measurement watchdog: longer gaps force an emergency stop
    pub max_measurement_duration: Duration,
}

/// What a tick did, for the worker wrapped around this core.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    /// The converter was commanded (run/stop/target update) this tick
    pub converter_action: bool,
    /// False while the watchdog considers the measurement stream lost
    pub readings_valid: bool,
}

/// The control core: owns the converter and both cascade loops.
pub struct StageControl {
    converter: Box<dyn FrequencyConverter>,
    angle: StageAngleController,
    speed: StageSpeedController,
    settings: StageControlSettings,
    state: MotorState,
    motor_running: bool,
    motor_running_forward: bool,
    last_target: f64,
    last_target_update: Option<Instant>,
    active: Option<Command>,
    stopping: bool,
    last_measurement: Instant,
    invalid_readings: bool,
}

impl StageControl {
    /// Creates an idle controller. `now` seeds the measurement watchdog.
    pub fn new(
        converter: Box<dyn FrequencyConverter>,
        angle: StageAngleController,
        speed: StageSpeedController,
        settings: StageControlSettings,
        now: Instant,
    ) -> Self {
        Self {
            converter,
            angle,
            speed,
            settings,
            state: MotorState::Idle,
            motor_running: false,
            motor_running_forward: true,
            last_target: 0.0,
            last_target_update: None,
            active: None,
            stopping: false,
            last_measurement: now,
            invalid_readings: false,
        }
    }

    /// One control iteration: apply `readings` in order, run the watchdog,
    /// apply `commands` in order, forward the cascade and step the motor
    /// state machine.
    pub fn tick(
        &mut self,
        readings: &[Reading],
        commands: &[Command],
        now: Instant,
    ) -> Result<TickReport> {
        let mut report = TickReport::default();

        for reading in readings {
            self.apply_reading(reading, now);
        }
        if !readings.is_empty() {
            self.last_measurement = now;
        }

        // Watchdog: a lost measurement stream means the stage state is
        // unknown; moving blind is not acceptable.
        if now.saturating_duration_since(self.last_measurement)
            > self.settings.max_measurement_duration
        {
            if self.state != MotorState::EmergencyStopped {
                warn!("measurement stream lost, emergency stop");
                self.emergency_stop()?;
                report.converter_action = true;
            }
            self.invalid_readings = true;
        } else {
            self.invalid_readings = false;
        }

        for command in commands {
            if matches!(command, Command::EmergencyStop) {
                if self.state != MotorState::EmergencyStopped {
                    self.emergency_stop()?;
                    report.converter_action = true;
                }
                self.active = Some(Command::EmergencyStop);
                continue;
            }
            if self.invalid_readings {
                warn!(?command, "readings invalid, command ignored");
                continue;
            }
            if !self.set_activity(command.clone()) {
                warn!(?command, "command rejected (missing measurements)");
            }
        }

        // A finished graceful-stop rollout becomes a plain stop.
        if self.stopping && !self.motor_running {
            self.angle.disengage();
            let _ = self.speed.set_setpoint(0.0);
            self.active = Some(Command::Stop);
            self.stopping = false;
            debug!("stop rollout finished");
        }

        if self.update_motor(now)? {
            report.converter_action = true;
        }
        report.readings_valid = !self.invalid_readings;
        Ok(report)
    }

    fn apply_reading(&mut self, reading: &Reading, now: Instant) {
        match reading.kind {
            SensorKind::AbsoluteAngle => {
                self.angle.set_measurement(Angle::new(reading.value), now);
            }
            SensorKind::Speed => self.speed.set_measurement(reading.value, now),
        }
    }

    /// Dispatches a command to the cascade. Returns `false` when the
    /// command cannot be honored yet (e.g. no measurement seen); the caller
    /// surfaces a warning, the previous activity stays in place.
    pub fn set_activity(&mut self, command: Command) -> bool {
        let accepted = match &command {
            Command::EmergencyStop => true,
            Command::Stop => return self.dispatch_stop(),
            Command::RunToAngle {
                direction,
                speed,
                angle,
            } => {
                self.stopping = false;
                self.angle.set_setpoint(*angle, *speed, *direction)
            }
            Command::RunContinuous { speed, .. } => {
                self.stopping = false;
                self.angle.disengage();
                self.speed.set_setpoint(*speed)
            }
            Command::Remote { .. } => {
                self.stopping = false;
                self.angle.disengage();
                let _ = self.speed.set_setpoint(0.0);
                true
            }
        };
        if accepted {
            self.active = Some(command);
        }
        accepted
    }

    /// A stop while the motor runs decelerates over a rollout arc
    /// (`stop_angle` degrees per m/s of the active command's speed) instead
    /// of slamming the setpoint to zero. Without a running motor, an angle
    /// measurement or an active direction the stop is dispatched directly.
    fn dispatch_stop(&mut self) -> bool {
        if self.motor_running && !self.stopping {
            if let (Some(active), Some(current)) = (self.active.clone(), self.angle.last_angle()) {
                if let Some(direction) = active.direction() {
                    let speed = active.speed().unwrap_or(1.0);
                    let distance = self.settings.stop_angle * speed;
                    let target = match direction {
                        crate::command::Direction::Clockwise => current + distance,
                        crate::command::Direction::Counterclockwise => current - distance,
                    };
                    if self.angle.set_setpoint(target, speed, direction) {
                        debug!(%target, "stop rollout armed");
                        self.active = Some(Command::RunToAngle {
                            direction,
                            speed,
                            angle: target,
                        });
                        self.stopping = true;
                        return true;
                    }
                }
            }
        }
        self.stopping = false;
        self.angle.disengage();
        let accepted = self.speed.set_setpoint(0.0);
        if accepted {
            self.active = Some(Command::Stop);
        }
        accepted
    }

    /// Emergency stop: converter halted immediately, both loops disarmed.
    /// Terminal for the current command.
    pub fn emergency_stop(&mut self) -> Result<()> {
        self.converter.emergency_stop()?;
        self.motor_running = false;
        self.state = MotorState::EmergencyStopped;
        self.active = Some(Command::EmergencyStop);
        self.stopping = false;
        self.angle.disengage();
        self.speed.clear_setpoint();
        self.last_target = 0.0;
        Ok(())
    }

    /// Cascade forwarding and the motor state machine step.
    fn update_motor(&mut self, now: Instant) -> Result<bool> {
        // Outer loop output becomes the inner loop setpoint.
        if matches!(self.active, Some(Command::RunToAngle { .. })) {
            if let Some(control_speed) = self.angle.control_speed() {
                let _ = self.speed.set_setpoint(control_speed);
            }
        }

        let (frequency, steer_speed) = match &self.active {
            None | Some(Command::EmergencyStop) => (0.0, 0.0),
            Some(Command::Remote { frequency, .. }) => {
                (frequency * self.settings.max_frequency, 0.0)
            }
            Some(_) => {
                let Some(frequency) = self.speed.control_frequency() else {
                    // inner loop has not produced anything yet
                    return Ok(false);
                };
                let steer = match self.angle.control_speed() {
                    Some(speed) if self.angle.is_engaged() => speed,
                    _ => self.speed.measured_speed().unwrap_or(0.0),
                };
                (frequency, steer)
            }
        };
        // centi-Hz register resolution
        let frequency = (frequency.abs() * 100.0).round() / 100.0;

        if frequency < STOP_DEADBAND_HZ && self.motor_running {
            self.converter.stop()?;
            self.converter.set_target_frequency(0.0)?;
            self.motor_running = false;
            self.state = MotorState::Idle;
            self.last_target = 0.0;
            return Ok(true);
        }
        if frequency >= STOP_DEADBAND_HZ
            && !self.motor_running
            && self.active.as_ref().is_some_and(Command::is_run)
        {
            let forward = self
                .active
                .as_ref()
                .is_some_and(Command::turns_clockwise)
                ^ (steer_speed < 0.0);
            self.converter.run(forward)?;
            self.converter.set_target_frequency(frequency)?;
            self.motor_running = true;
            self.motor_running_forward = forward;
            self.state = if forward {
                MotorState::RunningForward
            } else {
                MotorState::RunningReverse
            };
            self.last_target = frequency;
            self.last_target_update = Some(now);
            return Ok(true);
        }
        if self.motor_running
            && (frequency - self.last_target).abs() > f64::EPSILON
            && frequency >= self.settings.min_target_frequency
        {
            let due = self
                .last_target_update
                .map_or(true, |t| now.saturating_duration_since(t) >= TARGET_UPDATE_INTERVAL);
            if due {
                self.converter.set_target_frequency(frequency)?;
                self.last_target = frequency;
                self.last_target_update = Some(now);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The command currently being executed
    pub fn active_command(&self) -> Option<&Command> {
        self.active.as_ref()
    }
    /// True between a `run` and the next `stop` on the converter
    pub fn motor_running(&self) -> bool {
        self.motor_running
    }
    /// Direction of the last `run` command
    pub fn motor_running_forward(&self) -> bool {
        self.motor_running_forward
    }
    /// Current motor state
    pub fn state(&self) -> MotorState {
        self.state
    }
    /// Last measured stage angle
    pub fn last_angle(&self) -> Option<Angle> {
        self.angle.last_angle()
    }
    /// Last frequency written to the converter
    pub fn target_frequency(&self) -> f64 {
        self.last_target
    }
    /// Outer-loop accessor (sweep progress etc.)
    pub fn angle_controller(&self) -> &StageAngleController {
        &self.angle
    }
    /// Inner-loop accessor
    pub fn speed_controller(&self) -> &StageSpeedController {
        &self.speed
    }
    /// Leaves the drive in a safe state. Called on every worker exit path
    /// so a restart never inherits a spinning motor.
    pub fn shutdown(&mut self) -> Result<()> {
        self.converter.stop()?;
        self.converter.set_target_frequency(0.0)?;
        self.motor_running = false;
        if self.state != MotorState::EmergencyStopped {
            self.state = MotorState::Idle;
        }
        self.last_target = 0.0;
        Ok(())
    }

    /// Drive state fed back to the simulated sensor in testing mode
    pub fn drive_feedback(&mut self) -> Result<crate::sensor::DriveFeedback> {
        Ok(crate::sensor::DriveFeedback {
            forward: self.motor_running_forward,
            frequency: self.converter.current_frequency()?,
        })
    }
}

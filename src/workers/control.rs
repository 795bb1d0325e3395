//! Control worker: the cascade and the motor, wrapped in channel plumbing.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::channel::{Receiver, Slot};
use crate::command::Command;
use crate::message::TelemetryFrame;
use crate::motor::{FrequencyConverter, Jslsm100, SimConverter};
use crate::runtime::{AppLink, Worker};
use crate::stage::{
    StageAngleController, StageControl, StageControlSettings, StageSpeedController,
};
use crate::supervisor::Launcher;
use crate::workers::names;
use crate::workers::sensor::SensorFeed;
use crate::{Error, Result};

/// Telemetry cadence cap (≤ 5 Hz)
const DEBUG_INTERVAL: Duration = Duration::from_millis(200);

/// Owns the [`StageControl`] core: drains sensor readings and commands each
/// tick, steps the cascade and the motor state machine, closes the
/// simulation loop in testing mode and emits debug telemetry.
pub struct ControlWorker {
    sensor_feed: SensorFeed,
    commands: Receiver<Command>,
    control: Option<StageControl>,
    last_debug: Instant,
}

impl ControlWorker {
    fn new(sensor_feed: SensorFeed, commands: Receiver<Command>) -> Self {
        Self {
            sensor_feed,
            commands,
            control: None,
            last_debug: Instant::now(),
        }
    }
}

impl Worker for ControlWorker {
    fn name(&self) -> &'static str {
        names::CONTROL
    }

    fn setup(&mut self, app: &mut AppLink) -> Result<()> {
        let max_frequency = app.config_f64("motor", "max_frequency", 40.0)?;
        let min_target_frequency = app.config_f64("motor", "min_frequency", 0.5)?;
        let angle_kp = app.config_f64("control", "angle_pid_kp", 2.0)?;
        let angle_ki = app.config_f64("control", "angle_pid_ki", 0.0)?;
        let angle_kd = app.config_f64("control", "angle_pid_kd", 0.0)?;
        let speed_kp = app.config_f64("control", "speed_pid_kp", 10.0)?;
        let speed_ki = app.config_f64("control", "speed_pid_ki", 0.0)?;
        let speed_kd = app.config_f64("control", "speed_pid_kd", 0.0)?;
        let max_measurement_duration =
            app.config_i64("control", "max_measurement_duration", 100)?;
        let max_measurement_duration = u64::try_from(max_measurement_duration).map_err(|_| {
            Error::invalid_data(format!(
                "bad measurement watchdog: {max_measurement_duration}"
            ))
        })?;
        let stop_angle = app.config_f64("control", "stop_angle", 90.0)?;

        let converter: Box<dyn FrequencyConverter> = if app.is_testing_enabled() {
            Box::new(SimConverter::new())
        } else {
            let address = app.config_i64("motor", "address", 1)?;
            let address = u8::try_from(address)
                .map_err(|_| Error::invalid_data(format!("bad modbus address: {address}")))?;
            let port = app.config_str("motor", "port", "/dev/serial0:9600:8:N:1")?;
            let mut drive = Jslsm100::create(&port, address)?;
            match drive.version() {
                Ok((major, minor)) => info!(version = %format!("{major}.{minor}"), "drive online"),
                Err(e) => warn!(error = %e, "drive version not readable"),
            }
            Box::new(drive)
        };

        self.control = Some(StageControl::new(
            converter,
            StageAngleController::new(angle_kp, angle_ki, angle_kd),
            StageSpeedController::new(speed_kp, speed_ki, speed_kd, max_frequency),
            StageControlSettings {
                max_frequency,
                min_target_frequency,
                stop_angle,
                max_measurement_duration: Duration::from_millis(max_measurement_duration),
            },
            Instant::now(),
        ));
        Ok(())
    }

    fn tick(&mut self, app: &mut AppLink) -> Result<()> {
        let control = self
            .control
            .as_mut()
            .ok_or_else(|| Error::failed("control worker not set up"))?;

        let mut readings = Vec::new();
        for batch in self.sensor_feed.rx.drain() {
            readings.extend(batch);
        }
        let commands = self.commands.drain();

        let report = control.tick(&readings, &commands, Instant::now())?;

        if report.converter_action && app.is_testing_enabled() {
            let feedback = control.drive_feedback()?;
            self.sensor_feed.send(feedback)?;
        }

        if app.is_debug_enabled() && self.last_debug.elapsed() > DEBUG_INTERVAL {
            if let Some(angle) = control.last_angle() {
                app.send_data(TelemetryFrame {
                    angle_rad: angle.radians(),
                    frequency: control.target_frequency(),
                })?;
                self.last_debug = Instant::now();
            }
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<Option<i32>> {
        // the drive must never survive a worker exit still spinning
        if let Some(control) = self.control.as_mut() {
            control.shutdown()?;
        }
        Ok(None)
    }
}

/// Builds [`ControlWorker`] instances from the endpoints published by the
/// sensor and view launchers.
pub struct ControlLauncher {
    sensor_feed: Slot<SensorFeed>,
    commands: Slot<Receiver<Command>>,
}

impl ControlLauncher {
    /// Endpoints are taken from the slots on every build, so a restarted
    /// control worker picks up the current peers.
    pub fn new(sensor_feed: Slot<SensorFeed>, commands: Slot<Receiver<Command>>) -> Self {
        Self {
            sensor_feed,
            commands,
        }
    }
}

impl Launcher for ControlLauncher {
    fn name(&self) -> &'static str {
        names::CONTROL
    }
    fn build(&mut self) -> Result<Box<dyn Worker>> {
        let sensor_feed = self
            .sensor_feed
            .get()
            .ok_or_else(|| Error::Supervisor("sensor feed not wired yet".to_owned()))?;
        let commands = self
            .commands
            .get()
            .ok_or_else(|| Error::Supervisor("command channel not wired yet".to_owned()))?;
        // a rebuilt worker must not act on readings queued up while its
        // predecessor was down
        sensor_feed.rx.drain();
        commands.drain();
        Ok(Box::new(ControlWorker::new(sensor_feed, commands)))
    }
}

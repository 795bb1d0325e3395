//! Sensor worker: publishes absolute-angle and derived speed readings.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::channel::{duplex, Duplex, Slot};
use crate::runtime::{AppLink, Worker};
use crate::sensor::rotation::{OpticalRotationSensor, RotationSensor, SimRotationSensor};
use crate::sensor::speed::SpeedEstimator;
use crate::sensor::{DriveFeedback, Reading};
use crate::supervisor::Launcher;
use crate::workers::{names, DATA_CHANNEL_CAPACITY};
use crate::{Error, Result};

/// The control worker's end of the sensor link: sends drive feedback (only
/// used in testing mode), receives reading batches.
pub type SensorFeed = Duplex<DriveFeedback, Vec<Reading>>;

/// Reads the rotation sensor, derives the rim speed and ships both to the
/// control worker. Raises when either stream dries up, which makes the
/// supervisor restart this worker (and the control worker with it).
pub struct SensorWorker {
    link: Duplex<Vec<Reading>, DriveFeedback>,
    rotation: Option<Box<dyn RotationSensor>>,
    speed: Option<SpeedEstimator>,
    angle_timeout: Duration,
    speed_timeout: Duration,
    last_angle_measurement: Instant,
    last_speed_measurement: Instant,
}

impl SensorWorker {
    fn new(link: Duplex<Vec<Reading>, DriveFeedback>) -> Self {
        Self {
            link,
            rotation: None,
            speed: None,
            angle_timeout: Duration::from_secs(1),
            speed_timeout: Duration::from_secs(1),
            last_angle_measurement: Instant::now(),
            last_speed_measurement: Instant::now(),
        }
    }
}

impl Worker for SensorWorker {
    fn name(&self) -> &'static str {
        names::SENSOR
    }

    fn setup(&mut self, app: &mut AppLink) -> Result<()> {
        let stage_diameter = app.config_f64("default", "stage_diameter", 4.5)?;
        self.angle_timeout =
            Duration::from_secs_f64(app.config_f64("sensors", "angle_sensor_timeout", 1.0)?);
        self.speed_timeout =
            Duration::from_secs_f64(app.config_f64("sensors", "speed_sensor_timeout", 1.0)?);

        let mut rotation: Box<dyn RotationSensor> = if app.is_testing_enabled() {
            Box::new(SimRotationSensor::new(stage_diameter))
        } else {
            let tracker = app.config_str("sensors", "tracker", "127.0.0.1:1338")?;
            let camera_index = app.config_i64("sensors", "camera_index", 0)?;
            let marker_count = app.config_i64("sensors", "marker_count", 36)?;
            let camera_index = u8::try_from(camera_index)
                .map_err(|_| Error::invalid_data(format!("bad camera index: {camera_index}")))?;
            let marker_count = u16::try_from(marker_count)
                .map_err(|_| Error::invalid_data(format!("bad marker count: {marker_count}")))?;
            Box::new(OpticalRotationSensor::new(&tracker, camera_index, marker_count))
        };
        rotation.init()?;
        self.rotation = Some(rotation);
        self.speed = Some(SpeedEstimator::new(stage_diameter));

        let now = Instant::now();
        self.last_angle_measurement = now;
        self.last_speed_measurement = now;
        Ok(())
    }

    fn tick(&mut self, _app: &mut AppLink) -> Result<()> {
        let (Some(rotation), Some(speed)) = (self.rotation.as_mut(), self.speed.as_mut()) else {
            return Err(Error::sensor("sensor worker not set up"));
        };

        let mut batch: Vec<Reading> = Vec::with_capacity(2);
        let now = Instant::now();
        if let Some(angle) = rotation.measure_angle()? {
            self.last_angle_measurement = now;
            batch.push(Reading::angle(angle));
            if let Some(rim_speed) = speed.update(angle, now) {
                self.last_speed_measurement = now;
                batch.push(Reading::speed(rim_speed));
            }
        }

        if now.saturating_duration_since(self.last_angle_measurement) > self.angle_timeout {
            return Err(Error::sensor("not enough absolute angles measured in time"));
        }
        if now.saturating_duration_since(self.last_speed_measurement) > self.speed_timeout {
            return Err(Error::sensor("not enough speed points measured in time"));
        }

        // Drive feedback closes the simulation loop; the optical sensor
        // ignores it.
        for feedback in self.link.rx.drain() {
            rotation.apply_drive_feedback(feedback);
        }

        if !batch.is_empty() {
            self.link.send(batch)?;
        }
        Ok(())
    }

    fn teardown(&mut self) -> Result<Option<i32>> {
        if let Some(mut rotation) = self.rotation.take() {
            rotation.release()?;
        }
        debug!("sensor worker released");
        Ok(None)
    }
}

/// Builds [`SensorWorker`] instances and publishes the control-side feed
/// endpoint for [`crate::workers::ControlLauncher`].
pub struct SensorLauncher {
    feed: Slot<SensorFeed>,
}

impl SensorLauncher {
    /// `feed` receives the control-side endpoint on every build
    pub fn new(feed: Slot<SensorFeed>) -> Self {
        Self { feed }
    }
}

impl Launcher for SensorLauncher {
    fn name(&self) -> &'static str {
        names::SENSOR
    }
    fn build(&mut self) -> Result<Box<dyn Worker>> {
        let (worker_side, control_side) =
            duplex::<Vec<Reading>, DriveFeedback>(DATA_CHANNEL_CAPACITY);
        self.feed.put(control_side);
        Ok(Box::new(SensorWorker::new(worker_side)))
    }
}

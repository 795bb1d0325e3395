//! Absolute rotation sensors.
//!
//! The marker detection itself (camera capture, ArUco tracking) runs in a
//! separate vision process; [`OpticalRotationSensor`] subscribes to it over
//! UDP and turns the detected marker ids into an absolute stage angle. The
//! stage rim carries `marker_count` markers, so marker `i` sits at
//! `i · 360 / marker_count` degrees; with several markers visible the
//! circular median of their angles is used.
//!
//! [`SimRotationSensor`] replaces the optics in `--testing` runs: it
//! integrates the drive feedback it is given into a synthetic stage angle.

use std::io::Cursor;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use binrw::{binrw, BinRead, BinWrite};
use tracing::debug;

use crate::angle::{angle_median, Angle};
use crate::sensor::DriveFeedback;
use crate::{Error, Result};

/// An absolute-angle sensor.
pub trait RotationSensor: Send {
    /// Acquires the underlying resource (socket, camera, ...)
    fn init(&mut self) -> Result<()> {
        Ok(())
    }
    /// Releases the underlying resource
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
    /// Takes one measurement. `None` means "no angle available right now"
    /// (e.g. no marker in sight) and is not an error.
    fn measure_angle(&mut self) -> Result<Option<Angle>>;
    /// Feeds the current drive state back into the sensor. Only the
    /// simulated sensor reacts to this.
    fn apply_drive_feedback(&mut self, _feedback: DriveFeedback) {}
}

/// Subscription datagram sent to the vision tracker.
#[binrw]
#[brw(little, magic = b"RSC1")]
struct TrackerSubscribe {
    camera: u8,
}

/// One detection frame from the vision tracker: the ids of all markers
/// visible in the camera frame.
#[binrw]
#[brw(little)]
struct MarkerFrame {
    count: u8,
    #[br(count = count)]
    ids: Vec<u16>,
}

/// Marker-feed rotation sensor.
pub struct OpticalRotationSensor {
    tracker: String,
    camera_index: u8,
    marker_count: u16,
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
}

/// How long one measurement waits for a detection frame. Short: the worker
/// loop handles cadence, a missing frame is simply `None`.
const FRAME_TIMEOUT: Duration = Duration::from_millis(50);

impl OpticalRotationSensor {
    /// Creates the sensor. `tracker` is the `host:port` of the vision
    /// process, `camera_index` selects its camera.
    pub fn new(tracker: &str, camera_index: u8, marker_count: u16) -> Self {
        Self {
            tracker: tracker.to_owned(),
            camera_index,
            marker_count,
            socket: None,
            buf: vec![0; 512],
        }
    }
}

impl RotationSensor for OpticalRotationSensor {
    fn init(&mut self) -> Result<()> {
        if self.marker_count == 0 {
            return Err(Error::invalid_data("marker count must be positive"));
        }
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.set_read_timeout(Some(FRAME_TIMEOUT))?;
        let mut frame = Cursor::new(Vec::with_capacity(8));
        TrackerSubscribe {
            camera: self.camera_index,
        }
        .write_le(&mut frame)?;
        socket.send_to(frame.get_ref(), self.tracker.as_str())?;
        debug!(tracker = %self.tracker, camera = self.camera_index, "subscribed to marker feed");
        self.socket = Some(socket);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.socket.take();
        Ok(())
    }

    fn measure_angle(&mut self) -> Result<Option<Angle>> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| Error::sensor("marker feed not initialized"))?;
        let size = match socket.recv(&mut self.buf) {
            Ok(size) => size,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let mut cursor = Cursor::new(&self.buf[..size]);
        let frame = MarkerFrame::read_le(&mut cursor)?;
        if frame.ids.is_empty() {
            return Ok(None);
        }
        let step = 360.0 / f64::from(self.marker_count);
        let angles: Vec<Angle> = frame
            .ids
            .iter()
            .map(|&id| Angle::new(step * f64::from(id)))
            .collect();
        Ok(angle_median(&angles))
    }
}

/// Synthetic rotation sensor for `--testing` runs.
///
/// Integrates `angular_velocity = (rim_speed · f / 60) / (diameter / 2)`
/// over wall clock, where the drive feedback supplies `f` and the
/// direction.
pub struct SimRotationSensor {
    rim_speed: f64,
    stage_diameter: f64,
    update_interval: Duration,
    angular_velocity: f64,
    forward: bool,
    current_angle: Angle,
    last_update: Instant,
}

impl SimRotationSensor {
    /// Creates a stage standing still at 180°.
    pub fn new(stage_diameter: f64) -> Self {
        Self {
            rim_speed: 1.0,
            stage_diameter,
            update_interval: Duration::from_millis(20),
            angular_velocity: 0.0,
            forward: true,
            current_angle: Angle::new(180.0),
            last_update: Instant::now(),
        }
    }
}

impl RotationSensor for SimRotationSensor {
    fn measure_angle(&mut self) -> Result<Option<Angle>> {
        let dt = self.last_update.elapsed();
        if dt < self.update_interval {
            return Ok(None);
        }
        let swept = (self.angular_velocity * dt.as_secs_f64()).to_degrees();
        self.current_angle = if self.forward {
            self.current_angle + swept
        } else {
            self.current_angle - swept
        };
        self.last_update = Instant::now();
        Ok(Some(self.current_angle))
    }

    fn apply_drive_feedback(&mut self, feedback: DriveFeedback) {
        self.angular_velocity =
            (self.rim_speed * (feedback.frequency / 60.0)) / (self.stage_diameter / 2.0);
        self.forward = feedback.forward;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn sim_sensor_stands_still_without_feedback() {
        let mut sensor = SimRotationSensor::new(4.5);
        thread::sleep(Duration::from_millis(25));
        let angle = sensor.measure_angle().unwrap().unwrap();
        assert!(angle.delta(Angle::new(180.0)) < 1e-9);
    }

    #[test]
    fn sim_sensor_integrates_feedback() {
        let mut sensor = SimRotationSensor::new(4.5);
        sensor.apply_drive_feedback(DriveFeedback {
            forward: true,
            frequency: 40.0,
        });
        thread::sleep(Duration::from_millis(30));
        let angle = sensor.measure_angle().unwrap().unwrap();
        // ω = (1.0 · 40/60) / 2.25 rad/s ≈ 16.97 °/s → a few tenths of a
        // degree in 30 ms, clockwise
        assert!(angle.degrees() > 180.0);
        assert!(angle.degrees() < 182.0);

        sensor.apply_drive_feedback(DriveFeedback {
            forward: false,
            frequency: 40.0,
        });
        thread::sleep(Duration::from_millis(120));
        let back = sensor.measure_angle().unwrap().unwrap();
        assert!(back.degrees() < angle.degrees());
    }

    #[test]
    fn sim_sensor_respects_update_interval() {
        let mut sensor = SimRotationSensor::new(4.5);
        thread::sleep(Duration::from_millis(25));
        assert!(sensor.measure_angle().unwrap().is_some());
        // immediately after, the interval has not elapsed again
        assert!(sensor.measure_angle().unwrap().is_none());
    }

    #[test]
    fn marker_frames_round_trip() {
        let frame = MarkerFrame {
            count: 3,
            ids: vec![0, 9, 18],
        };
        let mut cursor = Cursor::new(Vec::new());
        frame.write_le(&mut cursor).unwrap();
        cursor.set_position(0);
        let decoded = MarkerFrame::read_le(&mut cursor).unwrap();
        assert_eq!(decoded.ids, vec![0, 9, 18]);
    }
}

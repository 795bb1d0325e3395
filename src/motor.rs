//! Frequency converter drivers.
//!
//! [`FrequencyConverter`] is the narrow capability surface the control core
//! works against. Two implementations: [`Jslsm100`] speaks Modbus RTU to
//! the real JSLSM100 drive, [`SimConverter`] is the in-process stand-in for
//! `--testing` runs.

use std::time::Duration;

use rmodbus::client::ModbusRequest;
use rmodbus::{guess_response_frame_len, ModbusProto};
use tracing::{debug, warn};

use crate::comm::SerialTransport;
use crate::Result;

/// Drive firmware version register (major byte, minor byte)
const REG_VERSION: u16 = 0x0003;
/// Target frequency register, centi-Hz
const REG_TARGET_FREQUENCY: u16 = 0x0005;
/// Control word register
const REG_CONTROL: u16 = 0x0006;
/// Current output frequency register, centi-Hz
const REG_CURRENT_FREQUENCY: u16 = 0x000A;
/// Drive state register
const REG_STATE: u16 = 0x000E;

/// Control word bits (the low five bits select the run mode)
const CTL_STOP: u16 = 0b00001;
const CTL_RUN_FORWARD: u16 = 0b00010;
const CTL_RUN_REVERSE: u16 = 0b00100;
const CTL_MODE_MASK: u16 = 0b11111;
/// Magic control word for the drive's emergency stop
const CTL_EMERGENCY_STOP: u16 = 0xB4;

/// Inter-frame delay for RTU framing on the shared serial bus
const FRAME_DELAY: Duration = Duration::from_millis(10);
/// Serial read timeout; register exchanges are a few bytes each way
const BUS_TIMEOUT: Duration = Duration::from_secs(1);

/// Control surface of a variable-frequency motor drive.
pub trait FrequencyConverter: Send {
    /// Starts the motor in the given direction
    fn run(&mut self, forward: bool) -> Result<()>;
    /// Ramps the motor down to standstill
    fn stop(&mut self) -> Result<()>;
    /// Stops immediately, bypassing the ramp. Latched on the drive until a
    /// new run command.
    fn emergency_stop(&mut self) -> Result<()>;
    /// Sets the target frequency in Hz (resolution 0.01 Hz)
    fn set_target_frequency(&mut self, frequency: f64) -> Result<()>;
    /// Reads the current output frequency in Hz
    fn current_frequency(&mut self) -> Result<f64>;
}

/// JSLSM100 frequency converter on a Modbus RTU serial bus.
pub struct Jslsm100 {
    transport: SerialTransport,
    unit_id: u8,
}

impl Jslsm100 {
    /// Creates the driver. `path` uses the serial path syntax of
    /// [`SerialTransport::create`]; the port is opened on first use.
    pub fn create(path: &str, unit_id: u8) -> Result<Self> {
        Ok(Self {
            transport: SerialTransport::create(path, BUS_TIMEOUT, FRAME_DELAY)?,
            unit_id,
        })
    }
    fn request(&self) -> ModbusRequest {
        ModbusRequest::new(self.unit_id, ModbusProto::Rtu)
    }
    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.transport.write(request)?;
        let mut head = [0u8; 6];
        self.transport.read_exact(&mut head)?;
        let mut response = head.to_vec();
        let len = guess_response_frame_len(&head, ModbusProto::Rtu)?;
        if len > 6 {
            let mut rest = vec![0u8; usize::from(len) - 6];
            self.transport.read_exact(&mut rest)?;
            response.extend(rest);
        }
        Ok(response)
    }
    fn read_register(&mut self, reg: u16) -> Result<u16> {
        let mut mreq = self.request();
        let mut frame = Vec::with_capacity(16);
        mreq.generate_get_holdings(reg, 1, &mut frame)?;
        let response = self.transact(&frame)?;
        let data = mreq.parse_slice(&response)?;
        if data.len() < 2 {
            return Err(crate::Error::comm("short modbus response"));
        }
        Ok(u16::from(data[0]) << 8 | u16::from(data[1]))
    }
    fn write_register(&mut self, reg: u16, value: u16) -> Result<()> {
        let mut mreq = self.request();
        let mut frame = Vec::with_capacity(16);
        mreq.generate_set_holding(reg, value, &mut frame)?;
        let response = self.transact(&frame)?;
        mreq.parse_ok(&response)?;
        Ok(())
    }
    fn write_control_mode(&mut self, mode: u16) -> Result<()> {
        // read-modify-write: the upper bits of the control word hold other
        // drive settings and must be preserved
        let current = self.read_register(REG_CONTROL)?;
        self.write_register(REG_CONTROL, (current & !CTL_MODE_MASK) | mode)
    }
    /// Drive firmware version as (major, minor)
    pub fn version(&mut self) -> Result<(u8, u8)> {
        let version = self.read_register(REG_VERSION)?;
        Ok(((version >> 8) as u8, (version & 0x00ff) as u8))
    }
    /// Raw drive state word
    pub fn state(&mut self) -> Result<u16> {
        self.read_register(REG_STATE)
    }
}

impl FrequencyConverter for Jslsm100 {
    fn run(&mut self, forward: bool) -> Result<()> {
        self.write_control_mode(if forward {
            CTL_RUN_FORWARD
        } else {
            CTL_RUN_REVERSE
        })
    }
    fn stop(&mut self) -> Result<()> {
        self.write_control_mode(CTL_STOP)
    }
    fn emergency_stop(&mut self) -> Result<()> {
        // full control word, no masking: the drive treats 0xB4 as a
        // dedicated emergency pattern
        self.write_register(REG_CONTROL, CTL_EMERGENCY_STOP)
    }
    fn set_target_frequency(&mut self, frequency: f64) -> Result<()> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let centi_hz = (frequency.max(0.0) * 100.0).round() as u16;
        self.write_register(REG_TARGET_FREQUENCY, centi_hz)
    }
    fn current_frequency(&mut self) -> Result<f64> {
        Ok(f64::from(self.read_register(REG_CURRENT_FREQUENCY)?) * 0.01)
    }
}

/// In-process converter stand-in for `--testing`.
///
/// Remembers what it was told; `current_frequency` reports the target while
/// running and 0 otherwise, which is what the simulated rotation sensor
/// integrates.
pub struct SimConverter {
    target: f64,
    running: bool,
    forward: bool,
    emergency: bool,
}

impl SimConverter {
    /// Creates an idle converter
    pub fn new() -> Self {
        Self {
            target: 0.0,
            running: false,
            forward: true,
            emergency: false,
        }
    }
    /// True after a `run` without a subsequent `stop`/`emergency_stop`
    pub fn is_running(&self) -> bool {
        self.running
    }
    /// True while the emergency latch is set
    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency
    }
    /// Last commanded target frequency
    pub fn target_frequency(&self) -> f64 {
        self.target
    }
    /// Last commanded direction
    pub fn is_forward(&self) -> bool {
        self.forward
    }
}

impl Default for SimConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyConverter for SimConverter {
    fn run(&mut self, forward: bool) -> Result<()> {
        self.running = true;
        self.forward = forward;
        self.emergency = false;
        debug!(forward, "sim converter: run");
        Ok(())
    }
    fn stop(&mut self) -> Result<()> {
        self.running = false;
        debug!("sim converter: stop");
        Ok(())
    }
    fn emergency_stop(&mut self) -> Result<()> {
        self.running = false;
        self.emergency = true;
        warn!("sim converter: EMERGENCY STOP");
        Ok(())
    }
    fn set_target_frequency(&mut self, frequency: f64) -> Result<()> {
        self.target = frequency;
        debug!(frequency, "sim converter: target frequency");
        Ok(())
    }
    fn current_frequency(&mut self) -> Result<f64> {
        Ok(if self.running { self.target } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_converter_tracks_the_last_commands() {
        let mut c = SimConverter::new();
        assert!(!c.is_running());
        c.run(false).unwrap();
        c.set_target_frequency(12.5).unwrap();
        assert!(c.is_running());
        assert!(!c.is_forward());
        assert_eq!(c.current_frequency().unwrap(), 12.5);
        c.stop().unwrap();
        assert!(!c.is_running());
        assert_eq!(c.current_frequency().unwrap(), 0.0);
    }

    #[test]
    fn sim_converter_emergency_latch() {
        let mut c = SimConverter::new();
        c.run(true).unwrap();
        c.emergency_stop().unwrap();
        assert!(c.is_emergency_stopped());
        assert!(!c.is_running());
        // a fresh run clears the latch
        c.run(true).unwrap();
        assert!(!c.is_emergency_stopped());
    }
}

//! Serial port transport for the field bus.
//!
//! The port is described as `dev:baud:bits:parity:stop`
//! (e.g. `/dev/serial0:9600:8:N:1`), opened lazily on first use and
//! re-opened after any I/O error. The bus has exactly one owner (the
//! control worker), so no cross-thread locking is needed here.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serial::prelude::*;
use serial::SystemPort;

use crate::{Error, Result};

/// Serial transport with lazy open and reconnect-on-error.
pub struct SerialTransport {
    path: String,
    settings: PortSettings,
    timeout: Duration,
    frame_delay: Duration,
    port: Option<SystemPort>,
    last_frame: Option<Instant>,
}

struct PortSettings {
    baud_rate: serial::BaudRate,
    char_size: serial::CharSize,
    parity: serial::Parity,
    stop_bits: serial::StopBits,
}

fn parse_path(path: &str) -> Result<(String, PortSettings)> {
    let mut sp = path.split(':');
    let dev = sp
        .next()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| Error::invalid_data(format!("serial device not specified: {path}")))?;
    let s_baud = sp
        .next()
        .ok_or_else(|| Error::invalid_data(format!("serial baud rate not specified: {path}")))?;
    let s_bits = sp
        .next()
        .ok_or_else(|| Error::invalid_data(format!("serial char size not specified: {path}")))?;
    let s_parity = sp
        .next()
        .ok_or_else(|| Error::invalid_data(format!("serial parity not specified: {path}")))?;
    let s_stop = sp
        .next()
        .ok_or_else(|| Error::invalid_data(format!("serial stop bits not specified: {path}")))?;
    let baud_rate = match s_baud {
        "110" => serial::Baud110,
        "300" => serial::Baud300,
        "600" => serial::Baud600,
        "1200" => serial::Baud1200,
        "2400" => serial::Baud2400,
        "4800" => serial::Baud4800,
        "9600" => serial::Baud9600,
        "19200" => serial::Baud19200,
        "38400" => serial::Baud38400,
        "57600" => serial::Baud57600,
        "115200" => serial::Baud115200,
        v => return Err(Error::invalid_data(format!("unsupported baud rate: {v}"))),
    };
    let char_size = match s_bits {
        "5" => serial::Bits5,
        "6" => serial::Bits6,
        "7" => serial::Bits7,
        "8" => serial::Bits8,
        v => return Err(Error::invalid_data(format!("unsupported char size: {v}"))),
    };
    let parity = match s_parity {
        "N" => serial::ParityNone,
        "E" => serial::ParityEven,
        "O" => serial::ParityOdd,
        v => return Err(Error::invalid_data(format!("unsupported parity: {v}"))),
    };
    let stop_bits = match s_stop {
        "1" => serial::Stop1,
        "2" => serial::Stop2,
        v => return Err(Error::invalid_data(format!("unsupported stop bits: {v}"))),
    };
    Ok((
        dev.to_owned(),
        PortSettings {
            baud_rate,
            char_size,
            parity,
            stop_bits,
        },
    ))
}

impl SerialTransport {
    /// Creates a transport; the port itself is opened on first I/O.
    /// Fails on a malformed path string.
    pub fn create(path: &str, timeout: Duration, frame_delay: Duration) -> Result<Self> {
        let (dev, settings) = parse_path(path)?;
        Ok(Self {
            path: dev,
            settings,
            timeout,
            frame_delay,
            port: None,
            last_frame: None,
        })
    }
    fn open(&mut self) -> Result<&mut SystemPort> {
        if self.port.is_none() {
            let mut port = serial::open(&self.path)?;
            let settings = &self.settings;
            port.reconfigure(&|s| {
                s.set_baud_rate(settings.baud_rate)?;
                s.set_char_size(settings.char_size);
                s.set_parity(settings.parity);
                s.set_stop_bits(settings.stop_bits);
                s.set_flow_control(serial::FlowNone);
                Ok(())
            })?;
            port.set_timeout(self.timeout)?;
            self.port = Some(port);
            self.last_frame = None;
        }
        self.port
            .as_mut()
            .ok_or_else(|| Error::comm("serial port unavailable"))
    }
    /// Drops the open port; the next I/O re-opens it
    pub fn reconnect(&mut self) {
        self.port.take();
        self.last_frame.take();
    }
    /// Writes a full frame, honoring the inter-frame delay the RTU framing
    /// requires
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        if let Some(last_frame) = self.last_frame {
            let elapsed = last_frame.elapsed();
            if elapsed < self.frame_delay {
                std::thread::sleep(self.frame_delay - elapsed);
            }
        }
        let port = self.open()?;
        if let Err(e) = port.write_all(buf) {
            self.reconnect();
            return Err(e.into());
        }
        self.last_frame = Some(Instant::now());
        Ok(())
    }
    /// Reads exactly `buf.len()` bytes
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let port = self.open()?;
        if let Err(e) = port.read_exact(buf) {
            self.reconnect();
            return Err(e.into());
        }
        Ok(())
    }
}

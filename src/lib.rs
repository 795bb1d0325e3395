//! Rotating stage controller.
//!
//! The crate drives a physically rotating stage: an optical sensor tracks the
//! absolute stage angle, a cascaded PID pipeline (angle → speed → frequency)
//! computes the motor frequency and a JSLSM100 frequency converter is
//! commanded over Modbus RTU. Operator commands arrive over OSC/UDP.
//!
//! Runtime model: a supervisor ([`supervisor::Supervisor`]) hosts isolated
//! loop-based workers ([`runtime::Worker`]), one full-duplex message channel
//! per worker ([`channel::Duplex`]). Workers fetch their configuration from
//! the supervisor via a small request/response protocol ([`message::Message`])
//! during setup and are restarted (with their dependents) on errors.

use core::num;

/// The crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// The crate error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// the channel is full and the value can not be sent
    #[error("channel full")]
    ChannelFull,
    /// The channel is closed (all transmitters/receivers gone)
    #[error("channel closed")]
    ChannelClosed,
    /// Receive attempt failed because the channel is empty
    #[error("channel empty")]
    ChannelEmpty,
    /// Timeouts
    #[error("timed out")]
    Timeout,
    /// Standard I/O errors
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),
    /// Field bus / serial communication errors
    #[error("communication error: {0}")]
    Comm(String),
    /// Configuration store / RPC errors
    #[error("config error: {0}")]
    Config(String),
    /// Invalid data received / parameters provided
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// Measurement stream loss (triggers a worker restart)
    #[error("sensor error: {0}")]
    Sensor(String),
    /// Supervisor lifecycle errors
    #[error("supervisor error: {0}")]
    Supervisor(String),
    /// All other errors
    #[error("operation failed: {0}")]
    Failed(String),
}

macro_rules! impl_error {
    ($t: ty, $key: ident) => {
        impl From<$t> for Error {
            fn from(err: $t) -> Self {
                Error::$key(err.to_string())
            }
        }
    };
}

impl_error!(rmodbus::ErrorKind, Comm);
impl_error!(serial::Error, Comm);
impl_error!(binrw::Error, InvalidData);
impl_error!(num::ParseIntError, InvalidData);
impl_error!(num::ParseFloatError, InvalidData);

impl Error {
    /// Creates a new invalid data error
    pub fn invalid_data<S: core::fmt::Display>(msg: S) -> Self {
        Error::InvalidData(msg.to_string())
    }
    /// Creates a new communication error (for non-standard I/O)
    pub fn comm<S: core::fmt::Display>(msg: S) -> Self {
        Error::Comm(msg.to_string())
    }
    /// Creates a new sensor stream error
    pub fn sensor<S: core::fmt::Display>(msg: S) -> Self {
        Error::Sensor(msg.to_string())
    }
    /// Creates a new function failed error
    pub fn failed<S: core::fmt::Display>(msg: S) -> Self {
        Error::Failed(msg.to_string())
    }
    /// Returns true if the error is a transient peer-disconnect: the other
    /// side of a channel is gone, usually because its worker is being
    /// restarted. Worker loops survive these (the host retries the loop).
    pub fn is_transient_disconnect(&self) -> bool {
        matches!(self, Error::ChannelClosed)
    }
}

pub mod angle;
pub mod channel;
pub mod comm;
pub mod command;
pub mod config;
pub mod message;
pub mod motor;
pub mod pid;
pub mod runtime;
pub mod sensor;
pub mod stage;
pub mod supervisor;
pub mod telemetry;
pub mod workers;

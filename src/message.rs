//! Message frames for the supervisor ↔ worker channels.

use crate::config::{ConfigKind, ConfigValue};

/// Debug telemetry emitted by the control worker at ≤ 5 Hz.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryFrame {
    /// Last measured stage angle, radians
    pub angle_rad: f64,
    /// Last commanded drive frequency, Hz
    pub frequency: f64,
}

/// A frame on a supervisor ↔ worker channel.
///
/// Both directions use the same type: the worker sends `Initialized`,
/// `Error`, `Data` and `ConfigRequest`; the supervisor sends `Stop` and
/// `ConfigResponse`.
#[derive(Debug, Clone)]
pub enum Message {
    /// Worker setup finished, the loop is about to start
    Initialized,
    /// Cooperative stop request
    Stop,
    /// The worker hit an error; the supervisor restarts it
    Error(String),
    /// Configuration lookup (worker → supervisor)
    ConfigRequest {
        section: String,
        option: String,
        kind: ConfigKind,
    },
    /// Configuration answer (supervisor → worker); `value` is `None` when
    /// the option is not present in the store
    ConfigResponse {
        section: String,
        option: String,
        value: Option<ConfigValue>,
    },
    /// Debug telemetry (worker → supervisor)
    Data(TelemetryFrame),
}

impl Message {
    /// Builds a config request frame
    pub fn config_request(section: &str, option: &str, kind: ConfigKind) -> Self {
        Message::ConfigRequest {
            section: section.to_owned(),
            option: option.to_owned(),
            kind,
        }
    }
    /// Builds an error frame from any error value
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Message::Error(err.to_string())
    }
}

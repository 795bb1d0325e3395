//! The three long-running workers and their service launchers.
//!
//! Launchers create fresh channel endpoints on every (re)start and publish
//! the far ends through [`crate::channel::Slot`]s, so the supervisor's
//! restart cascades re-wire dependent workers automatically.

pub mod control;
pub mod sensor;
pub mod view;

pub use control::{ControlLauncher, ControlWorker};
pub use sensor::{SensorLauncher, SensorWorker};
pub use view::{ViewLauncher, ViewWorker};

/// Capacity of the data-plane channels (readings, commands, feedback)
pub const DATA_CHANNEL_CAPACITY: usize = 1024;

/// Service names, shared between wiring and dependency declarations
pub mod names {
    /// Sensor worker service name
    pub const SENSOR: &str = "rsc-sensor";
    /// View worker service name
    pub const VIEW: &str = "rsc-view";
    /// Control worker service name
    pub const CONTROL: &str = "rsc-control";
}

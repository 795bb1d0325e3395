//! The cascaded stage control core.
//!
//! ```text
//! RunToAngle ──▶ StageAngleController ──▶ StageSpeedController ──▶ motor
//!                 (sweep → m/s)             (m/s → Hz)           state machine
//! ```
//!
//! `RunContinuous` bypasses the angle loop (the commanded speed goes
//! straight into the speed loop), `Remote` bypasses both loops.

pub mod angle_control;
pub mod control;
pub mod input;
pub mod speed_control;

pub use angle_control::StageAngleController;
pub use control::{MotorState, StageControl, StageControlSettings, TickReport};
pub use input::InputState;
pub use speed_control::StageSpeedController;

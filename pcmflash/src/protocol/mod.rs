//! LIA protocol implementation.

pub mod frame;
pub mod status;

// Re-export common types
pub use frame::{Command, CommandFrame, DeviceId, FRAME_TAG, ResponseFrame};
pub use status::{Severity, StatusRecord, StatusReport, classify};

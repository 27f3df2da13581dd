//! # pcmflash
//!
//! A library for reprogramming PCM targets over the network.
//!
//! Targets listen on a UDP multicast group and answer a small command set
//! (status, IP assignment, loader capture, erase, record upload, dump and
//! reboot). This crate provides:
//!
//! - Command and response frame encoding
//! - Status word classification
//! - A UDP multicast transport and the TCP reset trigger
//! - Command execution with soft validation and bounded retries
//! - Intel-HEX style firmware images
//! - The full burn pipeline and dump stream collection
//!
//! ## Features
//!
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use pcmflash::{NetConfig, Programmer};
//! use std::net::Ipv4Addr;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetConfig::new(Ipv4Addr::new(10, 0, 0, 1));
//!     let mut programmer = Programmer::open(&config)?;
//!
//!     let info = programmer.discover()?;
//!     println!("{} at {}", info.device_id, info.ip);
//!
//!     programmer.close();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod dump;
pub mod error;
pub mod executor;
pub mod image;
pub mod program;
pub mod protocol;
pub mod session;
pub mod transport;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker polled by the upload and dump loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

pub use {
    dump::{ContinuityTracker, DumpReport},
    error::{Error, Result},
    executor::{CommandExecutor, Diagnostic, DiagnosticSource, Response, RetryPolicy},
    image::{FirmwareImage, HexRecord, ImageSummary},
    program::{DeviceInfo, EraseKind, ProgramOptions, ProgramSession, ProgramState, Programmer},
    protocol::{Command, CommandFrame, DeviceId, ResponseFrame, Severity, StatusReport},
    session::Session,
    transport::{NetConfig, Transport, udp::UdpTransport},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        assert!(!is_interrupted_requested());
    }
}

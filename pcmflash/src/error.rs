//! Error types for pcmflash.

use crate::protocol::Command;
use std::io;
use thiserror::Error;

/// Result type for pcmflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pcmflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (socket, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No datagram arrived before the reply timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Malformed or truncated response frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Every attempt of a retried command came back with the error flag set.
    #[error("{command} failed after {attempts} attempts")]
    RetryExhausted {
        /// Command that was retried.
        command: Command,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A dump packet broke the `dataSeq` continuity.
    #[error("DataSeq Mismatch: expected {expected:#04x}, got {actual:#04x}")]
    SequenceContinuity {
        /// Expected data sequence number.
        expected: u8,
        /// Data sequence number actually received.
        actual: u8,
    },

    /// The target rejected a single-shot command.
    #[error("{command} rejected by target")]
    Rejected {
        /// Command that failed.
        command: Command,
    },

    /// Invalid firmware image.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Record checksum mismatch.
    #[error("Checksum mismatch on line {line}: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// Line number of the record.
        line: usize,
        /// Checksum computed from the record bytes.
        expected: u8,
        /// Checksum stored in the record.
        actual: u8,
    },

    /// Device identity is not a 4-digit hex code.
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),

    /// The embedding application asked the operation to stop.
    #[error("Operation interrupted")]
    Interrupted,
}

impl Error {
    /// Whether the error came from a timed-out socket operation.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

//! Status word interpretation.
//!
//! Every response carries a 16-bit status word. Each set bit maps to one
//! fixed message with a severity. Bits are numbered from the most significant
//! end: bit 0 is `0x8000`, bit 15 is `0x0001`. Bit 15 additionally marks the
//! end of a dump stream.

use std::fmt;

/// Number of status bits.
pub const STATUS_BITS: usize = 16;

/// Bit index of the dump-complete flag.
pub const DUMP_COMPLETE_BIT: usize = 15;

/// Severity of a status message or diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Severity {
    /// The command failed.
    Error,
    /// The command succeeded but something needs attention.
    Warning,
    /// Informational.
    Message,
    /// Progress chatter from the loader.
    Debug,
}

impl Severity {
    /// Log level matching this severity.
    pub fn log_level(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warning => log::Level::Warn,
            Self::Message => log::Level::Info,
            Self::Debug => log::Level::Debug,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Message => write!(f, "message"),
            Self::Debug => write!(f, "debug"),
        }
    }
}

/// One entry of the status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRecord {
    /// Severity of the condition.
    pub severity: Severity,
    /// Human-readable description.
    pub text: &'static str,
}

const fn record(severity: Severity, text: &'static str) -> StatusRecord {
    StatusRecord { severity, text }
}

/// Status table, indexed by bit number (0 = MSB).
pub static STATUS_TABLE: [StatusRecord; STATUS_BITS] = [
    record(Severity::Warning, "Reset vector required"),
    record(Severity::Debug, "Loader mode entered via control port"),
    record(Severity::Warning, "User code space invalid"),
    record(Severity::Error, "Loader command received while not in loader mode"),
    record(Severity::Error, "Frame length error"),
    record(Severity::Debug, "Processed multicast IP packet"),
    record(Severity::Error, "Record framing error"),
    record(Severity::Warning, "Unsupported record type"),
    record(Severity::Warning, "Skipped ID/config bits"),
    record(Severity::Error, "Checksum error"),
    record(Severity::Warning, "Invalid address, would overwrite loader"),
    record(Severity::Debug, "Finished programming record"),
    record(Severity::Debug, "Finished programming sequence"),
    record(Severity::Message, "Written to EEPROM"),
    record(Severity::Error, "Missing type 4 record"),
    record(Severity::Message, "Dump completed"),
];

/// Look up the table entry for a bit number.
pub fn lookup(bit: usize) -> Option<&'static StatusRecord> {
    STATUS_TABLE.get(bit)
}

/// Whether `bit` (0 = MSB) is set in `word`.
pub fn bit_is_set(word: u16, bit: usize) -> bool {
    bit < STATUS_BITS && word & (0x8000 >> bit) != 0
}

/// Classified status word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Messages for every set bit, MSB first.
    pub messages: Vec<StatusRecord>,
    /// Any set bit has Error severity.
    pub error: bool,
    /// Any set bit has Warning severity.
    pub warning: bool,
    /// Bit 15 is set.
    pub dump_complete: bool,
}

/// Classify a status word.
pub fn classify(word: u16) -> StatusReport {
    let mut report = StatusReport::default();

    for (bit, entry) in STATUS_TABLE.iter().enumerate() {
        if !bit_is_set(word, bit) {
            continue;
        }
        match entry.severity {
            Severity::Error => report.error = true,
            Severity::Warning => report.warning = true,
            Severity::Message | Severity::Debug => {},
        }
        report.messages.push(*entry);
    }

    report.dump_complete = bit_is_set(word, DUMP_COMPLETE_BIT);
    report
}

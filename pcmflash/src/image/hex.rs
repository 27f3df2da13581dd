//! Line-oriented firmware images.
//!
//! Images are Intel-HEX style text: every record is one line starting with
//! the `:` marker, followed by hex digits.
//!
//! ```text
//! :LL AAAA TT DD..DD CC
//!  |   |    |    |    +-- checksum (two's complement of the byte sum)
//!  |   |    |    +------- LL data bytes
//!  |   |    +------------ record type
//!  |   +----------------- 16-bit load address
//!  +--------------------- data length
//! ```
//!
//! Only data (0), end-of-file (1) and extended linear address (4) records
//! are sent to the target; every other line is skipped.

use crate::error::{Error, Result};
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// First character of every record.
pub const RECORD_MARKER: char = ':';

/// Record types the loader accepts.
pub const TRANSMITTED_TYPES: [u8; 3] = [0x00, 0x01, 0x04];

/// One line of a firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    /// 1-based line number in the source text.
    pub line: usize,
    /// Line text without its terminator.
    pub text: String,
}

impl HexRecord {
    /// Record type, if the line carries a marker and a readable type field.
    pub fn record_type(&self) -> Option<u8> {
        if !self.text.starts_with(RECORD_MARKER) {
            return None;
        }
        hex_byte(self.text.get(7..9)?)
    }

    /// Whether this line goes on the wire.
    pub fn is_transmitted(&self) -> bool {
        self.record_type()
            .is_some_and(|t| TRANSMITTED_TYPES.contains(&t))
    }

    /// Payload of the Upload command for this record.
    pub fn as_payload(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Check the length field and checksum of the record.
    pub fn verify(&self) -> Result<()> {
        let digits = self
            .text
            .strip_prefix(RECORD_MARKER)
            .ok_or_else(|| self.invalid("missing record marker"))?;
        if !digits.is_ascii() {
            return Err(self.invalid("non-hex character"));
        }
        if digits.len() < 10 || digits.len() % 2 != 0 {
            return Err(self.invalid("record too short or odd length"));
        }

        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| hex_byte(&digits[i..i + 2]))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| self.invalid("non-hex character"))?;

        let declared = usize::from(bytes[0]);
        if bytes.len() != declared + 5 {
            return Err(self.invalid(&format!(
                "length field says {declared} data bytes, record has {}",
                bytes.len() - 5
            )));
        }

        let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if sum != 0 {
            let (body, checksum) = bytes.split_at(bytes.len() - 1);
            let expected = body
                .iter()
                .fold(0u8, |acc, b| acc.wrapping_add(*b))
                .wrapping_neg();
            return Err(Error::ChecksumMismatch {
                line: self.line,
                expected,
                actual: checksum[0],
            });
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::InvalidImage(format!("line {}: {reason}", self.line))
    }
}

/// Two hex digits as a byte. Signs and whitespace are rejected.
fn hex_byte(digits: &str) -> Option<u8> {
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

/// Counts of an image's records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageSummary {
    /// Number of lines.
    pub lines: usize,
    /// Lines that will be uploaded.
    pub transmitted: usize,
    /// Lines that will be skipped.
    pub skipped: usize,
    /// Record count per record type.
    pub by_type: BTreeMap<u8, usize>,
}

/// A firmware image as an ordered list of text records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirmwareImage {
    records: Vec<HexRecord>,
}

impl FirmwareImage {
    /// Load an image from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading image from: {}", path.display());

        let text = fs::read_to_string(path)?;
        let image = Self::parse(&text);
        if image.records.is_empty() {
            return Err(Error::InvalidImage(format!("{} is empty", path.display())));
        }
        debug!(
            "Image has {} lines, {} to upload",
            image.records.len(),
            image.transmitted().count()
        );
        Ok(image)
    }

    /// Parse image text. Blank lines are dropped; order is preserved.
    pub fn parse(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    /// Build an image from individual lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let records = lines
            .into_iter()
            .enumerate()
            .filter_map(|(i, line)| {
                let text = line.as_ref().trim_end_matches(['\r', '\n']).trim_end();
                (!text.is_empty()).then(|| HexRecord {
                    line: i + 1,
                    text: text.to_string(),
                })
            })
            .collect();
        Self { records }
    }

    /// All records in file order.
    pub fn records(&self) -> &[HexRecord] {
        &self.records
    }

    /// Records that are sent to the target, in file order.
    pub fn transmitted(&self) -> impl Iterator<Item = &HexRecord> {
        self.records.iter().filter(|r| r.is_transmitted())
    }

    /// Verify every marked record.
    pub fn verify(&self) -> Result<()> {
        for record in self.records.iter().filter(|r| r.text.starts_with(RECORD_MARKER)) {
            record.verify()?;
        }
        debug!("Verified {} records", self.records.len());
        Ok(())
    }

    /// Count records by type.
    pub fn summary(&self) -> ImageSummary {
        let mut summary = ImageSummary {
            lines: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            if let Some(t) = record.record_type() {
                *summary.by_type.entry(t).or_default() += 1;
            }
            if record.is_transmitted() {
                summary.transmitted += 1;
            } else {
                summary.skipped += 1;
            }
        }
        summary
    }

    /// Total number of lines.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the image has no lines.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

//! Firmware image formats.

pub mod hex;

pub use hex::{FirmwareImage, HexRecord, ImageSummary};

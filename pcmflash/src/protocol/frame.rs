//! LIA frame encoding and response decoding.
//!
//! Requests carry a fixed 7-byte header followed by the raw payload. There is
//! no length prefix or checksum; each frame is exactly one UDP datagram.
//!
//! ```text
//! +--------+--------+--------+-----+-----------------+
//! |  Tag   |   Id   |  Seq   | Cmd |     Payload     |
//! +--------+--------+--------+-----+-----------------+
//! | 2 bytes| 2 bytes| 2 bytes|  1  |    variable     |
//! +--------+--------+--------+-----+-----------------+
//! | 5A A5  | device |  BE    | cmd |  command data   |
//! +--------+--------+--------+-----+-----------------+
//! ```
//!
//! Responses extend the header with target information:
//!
//! ```text
//! offset  0   2   4   6   7    8   9   10      12       16      18    19
//!         | tag | id | seq | cmd | pid | hw | sw | devId | ip      | status | dseq | data...
//! ```

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

/// Protocol magic carried in the first two bytes of every frame.
pub const FRAME_TAG: u16 = 0x5AA5;

/// Length of the request header.
pub const HEADER_LEN: usize = 7;

/// Length of the fixed response header; response data starts here.
pub const RESPONSE_HEADER_LEN: usize = 19;

/// Reply timeout for the erase commands.
pub const ERASE_TIMEOUT: Duration = Duration::from_secs(20);

/// Reply timeout for every other command.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// LIA command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum Command {
    /// Query status and identity.
    Stat = 0,
    /// Force the target's IPv4 address.
    SetIp = 1,
    /// Invalidate the user application.
    Invalidate = 2,
    /// Capture the target in loader mode.
    Capture = 3,
    /// Program one firmware record.
    Upload = 4,
    /// Stream program memory back to the host.
    Dump = 5,
    /// Erase program memory and EEPROM.
    EraseAll = 6,
    /// Erase program memory only.
    ErasePgm = 7,
    /// Erase EEPROM only.
    EraseEe = 8,
    /// Leave loader mode and restart the application.
    Reboot = 9,
}

impl Command {
    /// All commands in code order.
    pub const ALL: [Self; 10] = [
        Self::Stat,
        Self::SetIp,
        Self::Invalidate,
        Self::Capture,
        Self::Upload,
        Self::Dump,
        Self::EraseAll,
        Self::ErasePgm,
        Self::EraseEe,
        Self::Reboot,
    ];

    /// Wire code of the command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a command by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Whether this is one of the erase commands.
    pub fn is_erase(self) -> bool {
        matches!(self, Self::EraseAll | Self::ErasePgm | Self::EraseEe)
    }

    /// How long to wait for the target's reply to this command.
    pub fn reply_timeout(self) -> Duration {
        if self.is_erase() {
            ERASE_TIMEOUT
        } else {
            REPLY_TIMEOUT
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stat => "Stat",
            Self::SetIp => "SetIP",
            Self::Invalidate => "Invalidate",
            Self::Capture => "Capture",
            Self::Upload => "Upload",
            Self::Dump => "Dump",
            Self::EraseAll => "EraseAll",
            Self::ErasePgm => "ErasePgm",
            Self::EraseEe => "EraseEE",
            Self::Reboot => "Reboot",
        };
        f.write_str(name)
    }
}

/// Four-hex-digit target identity.
///
/// `0000` is the wildcard every target answers to; after discovery the
/// session switches to the identity reported by the target, which is derived
/// from the last two octets of its MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "String", try_from = "String")
)]
pub struct DeviceId(u16);

impl DeviceId {
    /// The wildcard identity `0000`.
    pub const WILDCARD: Self = Self(0);

    /// Create an identity from its numeric value.
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Derive the identity from a MAC address (last two octets).
    pub fn from_mac(mac: [u8; 6]) -> Self {
        Self(u16::from_be_bytes([mac[4], mac[5]]))
    }

    /// Numeric value.
    pub fn value(self) -> u16 {
        self.0
    }

    /// Whether this is the wildcard identity.
    pub fn is_wildcard(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 4 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidDeviceId(s.to_string()));
        }
        u16::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| Error::InvalidDeviceId(s.to_string()))
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    id: DeviceId,
    seq: u16,
    command: Command,
    payload: Vec<u8>,
}

impl CommandFrame {
    /// Build a frame for `command` addressed to `id` with sequence `seq`.
    pub fn new(id: DeviceId, seq: u16, command: Command, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            seq,
            command,
            payload: payload.into(),
        }
    }

    /// Encode the frame into its wire representation.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.write_u16::<BigEndian>(FRAME_TAG).unwrap();
        buf.write_u16::<BigEndian>(self.id.value()).unwrap();
        buf.write_u16::<BigEndian>(self.seq).unwrap();
        buf.push(self.command.code());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Target identity.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Sequence number.
    pub fn seq(&self) -> u16 {
        self.seq
    }

    /// Command code.
    pub fn command(&self) -> Command {
        self.command
    }

    /// Command payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A decoded reply from the target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResponseFrame {
    /// Frame tag, `0x5AA5` for well-formed replies.
    pub tag: u16,
    /// Identity the reply is addressed from.
    pub id: DeviceId,
    /// Echoed request sequence.
    pub seq: u16,
    /// Echoed command code (raw, may be unknown).
    pub cmd: u8,
    /// Protocol revision implemented by the target.
    pub protocol_id: u8,
    /// Hardware version.
    pub hw_version: u8,
    /// Firmware version.
    pub sw_version: u8,
    /// Identity of the target itself.
    pub device_id: DeviceId,
    /// Target's current IPv4 address.
    pub ip: Ipv4Addr,
    /// Status bits, see [`crate::protocol::status`].
    pub status_word: u16,
    /// Packet counter used by dump streams.
    pub data_seq: u8,
    /// Raw data following the header.
    pub data: Vec<u8>,
}

impl ResponseFrame {
    /// Decode a response datagram.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < RESPONSE_HEADER_LEN {
            return Err(Error::Protocol(format!(
                "response too short: {} bytes, need at least {RESPONSE_HEADER_LEN}",
                raw.len()
            )));
        }

        Ok(Self {
            tag: BigEndian::read_u16(&raw[0..2]),
            id: DeviceId(BigEndian::read_u16(&raw[2..4])),
            seq: BigEndian::read_u16(&raw[4..6]),
            cmd: raw[6],
            protocol_id: raw[7],
            hw_version: raw[8],
            sw_version: raw[9],
            device_id: DeviceId(BigEndian::read_u16(&raw[10..12])),
            ip: Ipv4Addr::new(raw[12], raw[13], raw[14], raw[15]),
            status_word: BigEndian::read_u16(&raw[16..18]),
            data_seq: raw[18],
            data: raw[RESPONSE_HEADER_LEN..].to_vec(),
        })
    }

    /// Encode the response into its wire representation.
    ///
    /// Targets produce these; the host side uses it for simulators and tests.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RESPONSE_HEADER_LEN + self.data.len());
        buf.write_u16::<BigEndian>(self.tag).unwrap();
        buf.write_u16::<BigEndian>(self.id.value()).unwrap();
        buf.write_u16::<BigEndian>(self.seq).unwrap();
        buf.push(self.cmd);
        buf.push(self.protocol_id);
        buf.push(self.hw_version);
        buf.push(self.sw_version);
        buf.write_u16::<BigEndian>(self.device_id.value()).unwrap();
        buf.extend_from_slice(&self.ip.octets());
        buf.write_u16::<BigEndian>(self.status_word).unwrap();
        buf.push(self.data_seq);
        buf.extend_from_slice(&self.data);
        buf
    }

    /// The echoed command, if the code is known.
    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.cmd)
    }

    /// Whether the tag matches the protocol magic.
    pub fn has_valid_tag(&self) -> bool {
        self.tag == FRAME_TAG
    }

    /// Data rendered as lowercase hex.
    pub fn data_hex(&self) -> String {
        use std::fmt::Write as _;

        self.data
            .iter()
            .fold(String::with_capacity(self.data.len() * 2), |mut s, b| {
                let _ = write!(s, "{b:02x}");
                s
            })
    }
}

//! Conversation state with one target.

use crate::protocol::DeviceId;
use std::net::Ipv4Addr;

/// Identity and sequence state of one conversation.
///
/// A session is owned by exactly one [`crate::CommandExecutor`]; every
/// command borrows it mutably, so two commands can never observe the same
/// sequence number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    id: DeviceId,
    seq: u16,
    last_ip: Option<Ipv4Addr>,
}

impl Session {
    /// Fresh session addressing the wildcard identity with sequence 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that already knows the target's identity.
    #[must_use]
    pub fn with_id(mut self, id: DeviceId) -> Self {
        self.id = id;
        self
    }

    /// Current target identity.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Sequence number the next frame will carry.
    pub fn seq(&self) -> u16 {
        self.seq
    }

    /// Last IP address the target reported or was forced to.
    pub fn last_ip(&self) -> Option<Ipv4Addr> {
        self.last_ip
    }

    /// Replace the target identity.
    pub fn adopt_id(&mut self, id: DeviceId) {
        self.id = id;
    }

    /// Record the target's IP address.
    pub fn set_last_ip(&mut self, ip: Ipv4Addr) {
        self.last_ip = Some(ip);
    }

    /// Move to the next sequence number, wrapping after 65535.
    pub fn advance(&mut self) {
        self.seq = self.seq.wrapping_add(1);
    }
}

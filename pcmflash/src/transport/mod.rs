//! Network transport abstraction.
//!
//! The protocol layer talks to the target through the [`Transport`] trait,
//! which bundles two channels:
//!
//! - a reusable datagram channel (UDP, multicast-capable) carrying LIA frames
//! - a one-shot stream channel (TCP) carrying the plain-text reset trigger
//!
//! ```text
//! +------------------+
//! | CommandExecutor  |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+      +-----------------------+
//! |  Transport trait | ---> | UdpTransport (std)    |
//! +------------------+      | MockTransport (tests) |
//!                           +-----------------------+
//! ```
//!
//! All operations block; every receive carries an explicit timeout.

pub mod udp;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::Result;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

/// Default multicast group the targets listen on.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(230, 10, 10, 11);

/// Default LIA UDP port.
pub const DEFAULT_PORT: u16 = 16384;

/// Default TCP control port of the running application.
pub const DEFAULT_CONTROL_PORT: u16 = 1000;

/// Plain-text command that restarts the application into discovery mode.
pub const RESET_COMMAND: &str = "~reset,sys";

/// Largest datagram accepted from the target.
pub const MAX_DATAGRAM_LEN: usize = 2048;

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    /// Multicast group for discovery and commands.
    pub group: Ipv4Addr,
    /// LIA UDP port.
    pub port: u16,
    /// TCP control port for the reset trigger.
    pub control_port: u16,
    /// Local interface address to bind to and join the group on.
    pub interface: Ipv4Addr,
    /// Local UDP port. Defaults to the LIA port so replies sent to the
    /// group are delivered; 0 picks an ephemeral port.
    pub local_port: u16,
    /// Multicast TTL.
    pub ttl: u32,
    /// Receive our own multicast frames (useful with a local simulator).
    pub loopback: bool,
    /// Connect/write timeout for the TCP trigger.
    pub connect_timeout: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            control_port: DEFAULT_CONTROL_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            local_port: DEFAULT_PORT,
            ttl: 1,
            loopback: false,
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl NetConfig {
    /// Create a configuration bound to the given local interface.
    pub fn new(interface: Ipv4Addr) -> Self {
        Self {
            interface,
            ..Default::default()
        }
    }

    /// Set the multicast group.
    #[must_use]
    pub fn with_group(mut self, group: Ipv4Addr) -> Self {
        self.group = group;
        self
    }

    /// Set the LIA UDP port, listening on it as well.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self.local_port = port;
        self
    }

    /// Set the TCP control port.
    #[must_use]
    pub fn with_control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    /// Set the local UDP port.
    #[must_use]
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Enable or disable multicast loopback.
    #[must_use]
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    /// Multicast destination for LIA frames.
    pub fn group_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }

    /// Unicast destination for LIA frames to a known target.
    pub fn unicast_addr(&self, ip: Ipv4Addr) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(ip, self.port))
    }

    /// TCP control endpoint of a target.
    pub fn control_addr(&self, ip: Ipv4Addr) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(ip, self.control_port))
    }
}

/// Blocking transport used by the command executor.
pub trait Transport: Send {
    /// Send one frame as a single datagram.
    fn send_to(&mut self, frame: &[u8], dest: SocketAddr) -> Result<()>;

    /// Wait up to `timeout` for the next datagram.
    ///
    /// Returns [`crate::Error::Timeout`] when nothing arrives in time.
    fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>>;

    /// Discard every datagram already queued, returning how many were dropped.
    fn drain(&mut self) -> usize;

    /// Open a fresh stream connection to `dest`, write `command` and close it.
    fn trigger(&mut self, dest: SocketAddr, command: &str) -> Result<()>;

    /// Close the datagram channel and release the socket.
    ///
    /// After calling this method, the transport cannot be used for further I/O.
    fn close(&mut self);
}

//! UDP/TCP transport over `std::net`.

use {
    crate::{
        error::{Error, Result},
        transport::{MAX_DATAGRAM_LEN, NetConfig, Transport},
    },
    log::{debug, trace},
    std::{
        io::{self, Write},
        net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpStream, UdpSocket},
        time::Duration,
    },
};

/// Native transport: one UDP socket for the session, TCP per trigger.
pub struct UdpTransport {
    socket: Option<UdpSocket>,
    config: NetConfig,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind the UDP socket and configure multicast once.
    ///
    /// The socket listens on the wildcard address so datagrams addressed to
    /// the group reach it; `interface` selects where the group is joined.
    pub fn open(config: &NetConfig) -> Result<Self> {
        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.local_port);
        let socket = UdpSocket::bind(local)?;

        socket.set_multicast_ttl_v4(config.ttl)?;
        socket.set_multicast_loop_v4(config.loopback)?;
        socket.set_write_timeout(Some(config.connect_timeout))?;
        if config.group.is_multicast() {
            socket.join_multicast_v4(&config.group, &config.interface)?;
        }

        debug!(
            "Opened UDP socket on {} (group {})",
            socket.local_addr()?,
            config.group_addr()
        );

        Ok(Self {
            socket: Some(socket),
            config: config.clone(),
            buf: vec![0u8; MAX_DATAGRAM_LEN],
        })
    }

    /// Local address of the UDP socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket()?.local_addr()?)
    }

    /// Network configuration the transport was opened with.
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or_else(socket_closed)
    }
}

fn socket_closed() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::NotConnected, "socket closed"))
}

impl Transport for UdpTransport {
    fn send_to(&mut self, frame: &[u8], dest: SocketAddr) -> Result<()> {
        trace!("UDP -> {dest}: {frame:02x?}");
        self.socket()?.send_to(frame, dest)?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        // A zero timeout would mean "block forever" to set_read_timeout.
        let timeout = timeout.max(Duration::from_millis(1));
        let socket = self.socket.as_ref().ok_or_else(socket_closed)?;
        socket.set_read_timeout(Some(timeout))?;

        match socket.recv_from(&mut self.buf) {
            Ok((n, from)) => {
                trace!("UDP <- {from}: {:02x?}", &self.buf[..n]);
                Ok(self.buf[..n].to_vec())
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(Error::Timeout(format!(
                    "no datagram within {} ms",
                    timeout.as_millis()
                )))
            },
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn drain(&mut self) -> usize {
        let Some(socket) = self.socket.as_ref() else {
            return 0;
        };
        if socket.set_nonblocking(true).is_err() {
            return 0;
        }
        let mut dropped = 0;
        while let Ok((n, from)) = socket.recv_from(&mut self.buf) {
            trace!("UDP <- {from}: {:02x?} (stale, dropped)", &self.buf[..n]);
            dropped += 1;
        }
        let _ = socket.set_nonblocking(false);
        if dropped > 0 {
            debug!("Dropped {dropped} stale datagram(s)");
        }
        dropped
    }

    fn trigger(&mut self, dest: SocketAddr, command: &str) -> Result<()> {
        debug!("TCP -> {dest}: {command}");
        let mut stream = TcpStream::connect_timeout(&dest, self.config.connect_timeout)?;
        stream.set_write_timeout(Some(self.config.connect_timeout))?;
        stream.write_all(command.as_bytes())?;
        stream.flush()?;
        let _ = stream.shutdown(Shutdown::Both);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            if self.config.group.is_multicast() {
                let _ = socket.leave_multicast_v4(&self.config.group, &self.config.interface);
            }
            debug!("Closed UDP socket");
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

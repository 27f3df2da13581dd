//! Scripted transport for unit tests.

use crate::error::{Error, Result};
use crate::protocol::{DeviceId, FRAME_TAG, ResponseFrame};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Produces the datagrams the target sends back for one request.
///
/// `None` entries simulate a receive timeout.
pub(crate) type Responder = Box<dyn FnMut(&[u8]) -> Vec<Option<Vec<u8>>> + Send>;

/// Transport that records every send and replays scripted replies.
pub(crate) struct MockTransport {
    pub(crate) sent: Vec<(Vec<u8>, SocketAddr)>,
    pub(crate) triggers: Vec<(SocketAddr, String)>,
    pub(crate) refuse_trigger: bool,
    pub(crate) timeouts: Vec<Duration>,
    pub(crate) drained: usize,
    pending: VecDeque<Option<Vec<u8>>>,
    scripted: VecDeque<Option<Vec<u8>>>,
    responder: Option<Responder>,
    closed: bool,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            sent: Vec::new(),
            triggers: Vec::new(),
            refuse_trigger: false,
            timeouts: Vec::new(),
            drained: 0,
            pending: VecDeque::new(),
            scripted: VecDeque::new(),
            responder: None,
            closed: false,
        }
    }

    /// Answer each request with whatever `responder` returns.
    pub(crate) fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Option<Vec<u8>>> + Send + 'static,
    {
        let mut transport = Self::new();
        transport.responder = Some(Box::new(responder));
        transport
    }

    /// Queue a datagram (or a timeout) independently of any request.
    ///
    /// Scripted datagrams are delivered after every responder reply and
    /// survive [`Transport::drain`].
    pub(crate) fn queue(&mut self, datagram: Option<Vec<u8>>) {
        self.scripted.push_back(datagram);
    }

    /// Command codes of every frame sent so far.
    pub(crate) fn sent_commands(&self) -> Vec<u8> {
        self.sent.iter().map(|(frame, _)| frame[6]).collect()
    }

    /// Payloads of every frame sent with `code`.
    pub(crate) fn payloads_of(&self, code: u8) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter(|(frame, _)| frame[6] == code)
            .map(|(frame, _)| frame[7..].to_vec())
            .collect()
    }
}

impl Transport for MockTransport {
    fn send_to(&mut self, frame: &[u8], dest: SocketAddr) -> Result<()> {
        if self.closed {
            return Err(Error::Io(io::Error::from(io::ErrorKind::NotConnected)));
        }
        self.sent.push((frame.to_vec(), dest));
        if let Some(responder) = self.responder.as_mut() {
            self.pending.extend(responder(frame));
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.timeouts.push(timeout);
        let next = self.pending.pop_front().or_else(|| self.scripted.pop_front());
        match next {
            Some(Some(datagram)) => Ok(datagram),
            Some(None) | None => Err(Error::Timeout("mock: no datagram".into())),
        }
    }

    fn drain(&mut self) -> usize {
        // Leftover responder replies model datagrams that arrived too late.
        let dropped = self.pending.iter().filter(|d| d.is_some()).count();
        self.pending.clear();
        self.drained += dropped;
        dropped
    }

    fn trigger(&mut self, dest: SocketAddr, command: &str) -> Result<()> {
        if self.refuse_trigger {
            return Err(Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused)));
        }
        self.triggers.push((dest, command.to_string()));
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Target-side reply to `request`, echoing its id, seq and command.
pub(crate) fn reply_to(request: &[u8], status_word: u16, data_seq: u8, data: &[u8]) -> Vec<u8> {
    ResponseFrame {
        tag: FRAME_TAG,
        id: DeviceId::new(u16::from_be_bytes([request[2], request[3]])),
        seq: u16::from_be_bytes([request[4], request[5]]),
        cmd: request[6],
        protocol_id: 1,
        hw_version: 2,
        sw_version: 3,
        device_id: DeviceId::new(0x3c7e),
        ip: Ipv4Addr::new(10, 0, 0, 42),
        status_word,
        data_seq,
        data: data.to_vec(),
    }
    .encode()
}

//! Command execution with soft validation and bounded retries.
//!
//! [`CommandExecutor::send`] never fails: transport errors, malformed replies
//! and identity/sequence mismatches are folded into the returned
//! [`Response`] as [`Diagnostic`]s. Only the retry wrapper escalates, with
//! [`Error::RetryExhausted`], once every attempt came back with the error
//! flag set.

use crate::error::{Error, Result};
use crate::protocol::frame::REPLY_TIMEOUT;
use crate::protocol::{Command, CommandFrame, ResponseFrame, Severity, classify};
use crate::session::Session;
use crate::transport::Transport;
use log::{debug, log, warn};
use std::fmt;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

/// Message attached to a response synthesized after a transport failure.
pub const NO_RESPONSE: &str = "No response";

/// Where a diagnostic originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DiagnosticSource {
    /// Socket failure or timeout.
    Transport,
    /// Truncated or malformed frame.
    Protocol,
    /// Reply came from an unexpected device id.
    Identity,
    /// Reply carried an unexpected sequence number.
    Sequence,
    /// Status bit reported by the target.
    Device,
    /// Program or dump pipeline.
    Pipeline,
}

/// One classified message about an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// Origin.
    pub source: DiagnosticSource,
    /// Command the diagnostic belongs to, if any.
    pub command: Option<Command>,
    /// Human-readable text.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic.
    pub fn new(
        severity: Severity,
        source: DiagnosticSource,
        command: Option<Command>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            source,
            command,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command {
            Some(cmd) => write!(f, "[{}] {cmd}: {}", self.severity, self.message),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

/// Outcome of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Command that was sent.
    pub command: Command,
    /// Sequence number the request carried.
    pub seq: u16,
    /// Decoded reply, absent on transport or decode failure.
    pub frame: Option<ResponseFrame>,
    /// Everything noticed about the exchange.
    pub diagnostics: Vec<Diagnostic>,
    /// The exchange failed.
    pub error: bool,
    /// The exchange succeeded with warnings.
    pub warning: bool,
    /// The target flagged the end of a dump stream.
    pub dump_complete: bool,
}

impl Response {
    fn empty(command: Command, seq: u16) -> Self {
        Self {
            command,
            seq,
            frame: None,
            diagnostics: Vec::new(),
            error: false,
            warning: false,
            dump_complete: false,
        }
    }

    /// Synthetic response for an exchange that got no reply.
    pub fn no_response(command: Command, seq: u16, cause: &Error) -> Self {
        let mut response = Self::empty(command, seq);
        response.error = true;
        response.diagnostics.push(Diagnostic::new(
            Severity::Error,
            DiagnosticSource::Transport,
            Some(command),
            format!("{NO_RESPONSE} ({cause})"),
        ));
        response
    }

    /// Whether the error flag is clear.
    pub fn is_ok(&self) -> bool {
        !self.error
    }
}

/// Attempt count and spacing for a retried command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Four immediate attempts, used for most commands.
    pub const COMMAND: Self = Self {
        attempts: 4,
        delay: Duration::ZERO,
    };

    /// Five attempts one second apart, used for IP forcing.
    pub const FORCE_IP: Self = Self {
        attempts: 5,
        delay: Duration::from_secs(1),
    };

    /// Single attempt.
    pub const ONCE: Self = Self {
        attempts: 1,
        delay: Duration::ZERO,
    };

    /// Create a policy.
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::COMMAND
    }
}

/// Sends frames for one session and interprets the replies.
///
/// The executor owns both the transport and the [`Session`]; the socket is
/// released when the executor is dropped or closed.
pub struct CommandExecutor<T: Transport> {
    transport: T,
    session: Session,
    destination: SocketAddr,
    trail: Vec<Diagnostic>,
}

impl<T: Transport> CommandExecutor<T> {
    /// Create an executor sending to `destination` (usually the multicast group).
    pub fn new(transport: T, destination: SocketAddr) -> Self {
        Self {
            transport,
            session: Session::new(),
            destination,
            trail: Vec::new(),
        }
    }

    /// Replace the session, e.g. to resume with a known device id.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    /// Current session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable session state.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Where frames are sent.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Send subsequent frames to `destination`.
    pub fn set_destination(&mut self, destination: SocketAddr) {
        debug!("Switching destination to {destination}");
        self.destination = destination;
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Every diagnostic recorded so far, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.trail
    }

    /// Take the recorded diagnostics, leaving the trail empty.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.trail)
    }

    /// Append a diagnostic that did not come from an exchange.
    pub fn note(&mut self, diagnostic: Diagnostic) {
        log!(diagnostic.severity.log_level(), "{diagnostic}");
        self.trail.push(diagnostic);
    }

    /// Close the transport.
    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Send one command and wait for its reply.
    ///
    /// Datagrams left over from earlier exchanges are dropped before the
    /// frame goes out, and replies echoing another command are skipped while
    /// waiting. The session sequence advances exactly once, whatever the
    /// outcome.
    pub fn send(&mut self, command: Command, payload: &[u8]) -> Response {
        let seq = self.session.seq();
        let frame = CommandFrame::new(self.session.id(), seq, command, payload);
        debug!(
            "{command} id={} seq={seq} ({} payload bytes) -> {}",
            frame.id(),
            payload.len(),
            self.destination
        );

        let stale = self.transport.drain();
        let mut response = match self.transport.send_to(&frame.encode(), self.destination) {
            Ok(()) => self.await_own_reply(command, seq, command.reply_timeout()),
            Err(e) => Response::no_response(command, seq, &e),
        };
        if stale > 0 {
            response.diagnostics.insert(
                0,
                Diagnostic::new(
                    Severity::Debug,
                    DiagnosticSource::Protocol,
                    Some(command),
                    format!("dropped {stale} stale datagram(s) before sending"),
                ),
            );
        }

        self.session.advance();
        self.record(&response);
        response
    }

    /// Send a command until one attempt succeeds or the policy runs out.
    pub fn send_with_retry(
        &mut self,
        command: Command,
        payload: &[u8],
        policy: RetryPolicy,
    ) -> Result<Response> {
        let attempts = policy.attempts.max(1);

        for attempt in 1..=attempts {
            if attempt > 1 && !policy.delay.is_zero() {
                thread::sleep(policy.delay);
            }

            let response = self.send(command, payload);
            if response.is_ok() {
                if attempt > 1 {
                    debug!("{command} succeeded on attempt {attempt}/{attempts}");
                }
                return Ok(response);
            }

            if attempt < attempts {
                warn!("{command} failed (attempt {attempt}/{attempts}), retrying");
            }
        }

        Err(Error::RetryExhausted { command, attempts })
    }

    /// Wait for an unsolicited follow-up datagram belonging to `seq`.
    ///
    /// Nothing is sent and the session sequence does not move.
    pub fn receive(&mut self, command: Command, seq: u16) -> Response {
        let response = self.await_reply(command, seq, REPLY_TIMEOUT);
        self.record(&response);
        response
    }

    fn await_reply(&mut self, command: Command, seq: u16, timeout: Duration) -> Response {
        match self.transport.recv(timeout) {
            Ok(raw) => self.interpret(command, seq, &raw),
            Err(e) => Response::no_response(command, seq, &e),
        }
    }

    /// Like [`Self::await_reply`], but a well-formed reply to another command
    /// is discarded and the wait continues until `timeout` runs out.
    fn await_own_reply(&mut self, command: Command, seq: u16, timeout: Duration) -> Response {
        let deadline = Instant::now() + timeout;
        let mut wait = timeout;
        let mut skipped = Vec::new();

        let mut response = loop {
            let raw = match self.transport.recv(wait) {
                Ok(raw) => raw,
                Err(e) => break Response::no_response(command, seq, &e),
            };
            match ResponseFrame::decode(&raw) {
                Ok(frame) if frame.has_valid_tag() && frame.cmd != command.code() => {
                    skipped.push(Diagnostic::new(
                        Severity::Warning,
                        DiagnosticSource::Protocol,
                        Some(command),
                        format!(
                            "discarded reply to command {:#04x} (seq {})",
                            frame.cmd, frame.seq
                        ),
                    ));
                },
                _ => break self.interpret(command, seq, &raw),
            }

            wait = deadline.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                let cause = Error::Timeout(format!("no {command} reply within {timeout:?}"));
                break Response::no_response(command, seq, &cause);
            }
        };

        if !skipped.is_empty() {
            response.warning = true;
            skipped.append(&mut response.diagnostics);
            response.diagnostics = skipped;
        }
        response
    }

    fn interpret(&self, command: Command, seq: u16, raw: &[u8]) -> Response {
        let mut response = Response::empty(command, seq);
        let diag = |severity, source, message: String| {
            Diagnostic::new(severity, source, Some(command), message)
        };

        let frame = match ResponseFrame::decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                response.error = true;
                response
                    .diagnostics
                    .push(diag(Severity::Error, DiagnosticSource::Protocol, e.to_string()));
                return response;
            },
        };

        if !frame.has_valid_tag() {
            response.error = true;
            response.diagnostics.push(diag(
                Severity::Error,
                DiagnosticSource::Protocol,
                format!("bad frame tag {:04x}", frame.tag),
            ));
        }
        if frame.cmd != command.code() {
            response.warning = true;
            response.diagnostics.push(diag(
                Severity::Warning,
                DiagnosticSource::Protocol,
                format!("reply echoes command {:#04x}", frame.cmd),
            ));
        }
        if frame.id != self.session.id() {
            response.warning = true;
            response.diagnostics.push(diag(
                Severity::Warning,
                DiagnosticSource::Identity,
                format!("id mismatch: expected {}, got {}", self.session.id(), frame.id),
            ));
        }
        if frame.seq != seq {
            response.warning = true;
            response.diagnostics.push(diag(
                Severity::Warning,
                DiagnosticSource::Sequence,
                format!("seq mismatch: expected {seq}, got {}", frame.seq),
            ));
        }

        let status = classify(frame.status_word);
        for entry in &status.messages {
            response.diagnostics.push(diag(
                entry.severity,
                DiagnosticSource::Device,
                entry.text.to_string(),
            ));
        }
        response.error |= status.error;
        response.warning |= status.warning;
        response.dump_complete = status.dump_complete;
        response.frame = Some(frame);
        response
    }

    fn record(&mut self, response: &Response) {
        for diagnostic in &response.diagnostics {
            log!(diagnostic.severity.log_level(), "{diagnostic}");
        }
        self.trail.extend(response.diagnostics.iter().cloned());
    }
}

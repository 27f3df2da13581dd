//! Dump stream collection.
//!
//! One Dump request makes the target stream its memory back as a series of
//! datagrams that all echo the request's sequence number. Every packet
//! carries a `dataSeq` byte that must count up by one (mod 256); the last
//! packet sets the "dump completed" status bit.

use crate::error::{Error, Result};
use crate::executor::{CommandExecutor, Diagnostic, DiagnosticSource, Response};
use crate::protocol::{Command, Severity};
use crate::transport::Transport;
use log::{debug, info};
use std::io::{self, Write};

/// Checks that data sequence numbers arrive in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuityTracker {
    last: Option<u8>,
}

impl ContinuityTracker {
    /// Accept `data_seq` if it follows the previous packet.
    ///
    /// The first packet is accepted whatever its number.
    pub fn accept(&mut self, data_seq: u8) -> Result<()> {
        if let Some(last) = self.last {
            let expected = last.wrapping_add(1);
            if data_seq != expected {
                return Err(Error::SequenceContinuity {
                    expected,
                    actual: data_seq,
                });
            }
        }
        self.last = Some(data_seq);
        Ok(())
    }
}

/// Result of a dump.
#[derive(Debug, Default)]
pub struct DumpReport {
    /// One line per accepted packet: `"<dataSeq> <hex data>"`.
    pub lines: Vec<String>,
    /// Whether the target signalled the end of the dump.
    pub complete: bool,
    /// Error that stopped the stream, if any.
    pub error: Option<Error>,
    /// Diagnostics collected while streaming.
    pub diagnostics: Vec<Diagnostic>,
}

impl DumpReport {
    /// Whether the dump ran to completion without error.
    pub fn succeeded(&self) -> bool {
        self.complete && self.error.is_none()
    }

    /// Write the accepted lines, newline-terminated.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for line in &self.lines {
            writeln!(writer, "{line}")?;
        }
        writer.flush()
    }
}

/// Request a dump and collect the stream until it completes or breaks.
///
/// Lines accepted before a failure are kept in the report.
pub fn collect<T: Transport>(executor: &mut CommandExecutor<T>) -> DumpReport {
    let mut report = DumpReport::default();
    let mut tracker = ContinuityTracker::default();

    info!("Requesting dump");
    let mut response = executor.send(Command::Dump, &[]);
    let seq = response.seq;

    loop {
        if let Err(e) = accept_packet(&response, &mut tracker, &mut report) {
            executor.note(Diagnostic::new(
                Severity::Error,
                DiagnosticSource::Pipeline,
                Some(Command::Dump),
                e.to_string(),
            ));
            report.error = Some(e);
            break;
        }
        if report.complete {
            info!("Dump complete: {} packets", report.lines.len());
            break;
        }
        if crate::is_interrupted_requested() {
            report.error = Some(Error::Interrupted);
            break;
        }
        response = executor.receive(Command::Dump, seq);
    }

    report.diagnostics = executor.take_diagnostics();
    report
}

fn accept_packet(
    response: &Response,
    tracker: &mut ContinuityTracker,
    report: &mut DumpReport,
) -> Result<()> {
    let Some(frame) = response.frame.as_ref() else {
        return Err(Error::Timeout(format!(
            "dump stream stalled after {} packets",
            report.lines.len()
        )));
    };
    if response.error {
        return Err(Error::Rejected {
            command: Command::Dump,
        });
    }
    if frame.command() != Some(Command::Dump) {
        return Err(Error::Protocol(format!(
            "dump stream interrupted by command {:#04x}",
            frame.cmd
        )));
    }

    tracker.accept(frame.data_seq)?;
    debug!("Dump packet {:02x}: {} bytes", frame.data_seq, frame.data.len());
    report
        .lines
        .push(format!("{:02x} {}", frame.data_seq, frame.data_hex()));
    report.complete = response.dump_complete;
    Ok(())
}

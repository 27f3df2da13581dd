//! Firmware burn pipeline.
//!
//! A burn walks the target through a fixed sequence of states; each step
//! runs only if the previous one succeeded:
//!
//! ```text
//! Idle -> Rebooted -> Discovered -> IpForced -> LoaderCaptured
//!      -> Erased -> Uploaded -> Exited
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use pcmflash::{FirmwareImage, NetConfig, ProgramOptions, Programmer};
//! use std::net::Ipv4Addr;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::from_file("pcm.hex")?;
//!     let config = NetConfig::new(Ipv4Addr::new(10, 0, 0, 1));
//!     let mut programmer = Programmer::open(&config)?;
//!
//!     let options = ProgramOptions::default().with_target_ip(Ipv4Addr::new(10, 0, 0, 42));
//!     let session = programmer.burn(&image, &options, |sent, total| {
//!         println!("{sent}/{total}");
//!     });
//!     session.into_result()?;
//!     Ok(())
//! }
//! ```

use crate::dump::DumpReport;
use crate::error::{Error, Result};
use crate::executor::{CommandExecutor, Diagnostic, DiagnosticSource, Response, RetryPolicy};
use crate::image::FirmwareImage;
use crate::protocol::{Command, DeviceId, ResponseFrame, Severity};
use crate::transport::{NetConfig, RESET_COMMAND, Transport};
use log::{debug, error, info, warn};
use std::fmt;
use std::net::Ipv4Addr;

/// Steps of a burn, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ProgramState {
    /// Nothing done yet.
    #[default]
    Idle,
    /// Reset trigger sent to the running application.
    Rebooted,
    /// Target answered the wildcard Stat; its identity is known.
    Discovered,
    /// Target accepted the forced IP address (or forcing was skipped).
    IpForced,
    /// Target is held in loader mode.
    LoaderCaptured,
    /// Program memory erased.
    Erased,
    /// Every transmittable record programmed.
    Uploaded,
    /// Loader left, application restarted.
    Exited,
}

impl fmt::Display for ProgramState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Rebooted => write!(f, "rebooted"),
            Self::Discovered => write!(f, "discovered"),
            Self::IpForced => write!(f, "IP forced"),
            Self::LoaderCaptured => write!(f, "loader captured"),
            Self::Erased => write!(f, "erased"),
            Self::Uploaded => write!(f, "uploaded"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

/// Which memory an erase targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EraseKind {
    /// Program memory and EEPROM.
    #[default]
    All,
    /// Program memory only.
    Program,
    /// EEPROM only.
    Eeprom,
}

impl EraseKind {
    /// Command implementing this erase.
    pub fn command(self) -> Command {
        match self {
            Self::All => Command::EraseAll,
            Self::Program => Command::ErasePgm,
            Self::Eeprom => Command::EraseEe,
        }
    }
}

/// Identity and versions reported by a target.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceInfo {
    /// Target identity.
    pub device_id: DeviceId,
    /// Target IPv4 address.
    pub ip: Ipv4Addr,
    /// Protocol revision.
    pub protocol_id: u8,
    /// Hardware version.
    pub hw_version: u8,
    /// Firmware version.
    pub sw_version: u8,
    /// Raw status word.
    pub status_word: u16,
}

impl From<&ResponseFrame> for DeviceInfo {
    fn from(frame: &ResponseFrame) -> Self {
        Self {
            device_id: frame.device_id,
            ip: frame.ip,
            protocol_id: frame.protocol_id,
            hw_version: frame.hw_version,
            sw_version: frame.sw_version,
            status_word: frame.status_word,
        }
    }
}

/// Burn options.
#[derive(Debug, Clone)]
pub struct ProgramOptions {
    /// Send the reset trigger before discovery.
    pub reboot: bool,
    /// Address of the target (reset trigger, IP forcing).
    pub target_ip: Option<Ipv4Addr>,
    /// Force `target_ip` onto the target after discovery.
    pub force_ip: bool,
    /// Switch to unicast once the IP is forced.
    pub unicast_after_force: bool,
    /// Retry policy for discovery, capture and each upload record.
    pub command_retry: RetryPolicy,
    /// Retry policy for IP forcing.
    pub force_ip_retry: RetryPolicy,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            reboot: true,
            target_ip: None,
            force_ip: true,
            unicast_after_force: true,
            command_retry: RetryPolicy::COMMAND,
            force_ip_retry: RetryPolicy::FORCE_IP,
        }
    }
}

impl ProgramOptions {
    /// Set the target address.
    #[must_use]
    pub fn with_target_ip(mut self, ip: Ipv4Addr) -> Self {
        self.target_ip = Some(ip);
        self
    }

    /// Enable or disable the reset trigger.
    #[must_use]
    pub fn with_reboot(mut self, reboot: bool) -> Self {
        self.reboot = reboot;
        self
    }

    /// Enable or disable IP forcing.
    #[must_use]
    pub fn with_force_ip(mut self, force: bool) -> Self {
        self.force_ip = force;
        self
    }
}

/// State and outcome of one burn.
#[derive(Debug, Default)]
pub struct ProgramSession {
    /// Address the target was asked to use.
    pub target_ip: Option<Ipv4Addr>,
    /// Loader mode was captured.
    pub captured_loader: bool,
    /// Program memory was erased.
    pub erased: bool,
    /// Records programmed successfully.
    pub records_sent: usize,
    /// Last state reached.
    pub state: ProgramState,
    /// Error that ended the burn, if any.
    pub last_error: Option<Error>,
    /// Every diagnostic collected during the burn.
    pub diagnostics: Vec<Diagnostic>,
}

impl ProgramSession {
    /// Whether the burn ran to completion.
    pub fn succeeded(&self) -> bool {
        self.last_error.is_none() && self.state == ProgramState::Exited
    }

    /// Convert into a `Result`, keeping the session on success.
    pub fn into_result(mut self) -> Result<Self> {
        match self.last_error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// High-level operations on one target.
pub struct Programmer<T: Transport> {
    executor: CommandExecutor<T>,
    config: NetConfig,
}

impl<T: Transport> Programmer<T> {
    /// Create a programmer over an existing transport.
    pub fn new(transport: T, config: NetConfig) -> Self {
        Self {
            executor: CommandExecutor::new(transport, config.group_addr()),
            config,
        }
    }

    /// Get a reference to the command executor.
    pub fn executor(&self) -> &CommandExecutor<T> {
        &self.executor
    }

    /// Get a mutable reference to the command executor.
    pub fn executor_mut(&mut self) -> &mut CommandExecutor<T> {
        &mut self.executor
    }

    /// Consume the programmer and return the executor.
    pub fn into_executor(self) -> CommandExecutor<T> {
        self.executor
    }

    /// Close the underlying transport.
    pub fn close(&mut self) {
        self.executor.close();
    }

    /// Ask the running application at `ip` to restart into discovery mode.
    pub fn reset_target(&mut self, ip: Ipv4Addr) -> Result<()> {
        let addr = self.config.control_addr(ip);
        info!("Sending reset trigger to {addr}");
        self.executor.transport_mut().trigger(addr, RESET_COMMAND)
    }

    /// Find the target with a wildcard Stat and adopt its identity.
    pub fn discover(&mut self) -> Result<DeviceInfo> {
        self.discover_with(RetryPolicy::COMMAND)
    }

    fn discover_with(&mut self, policy: RetryPolicy) -> Result<DeviceInfo> {
        self.executor.session_mut().adopt_id(DeviceId::WILDCARD);
        let response = self.executor.send_with_retry(Command::Stat, &[], policy)?;
        let frame = Self::frame_of(&response)?;
        let info = DeviceInfo::from(frame);

        let session = self.executor.session_mut();
        session.adopt_id(info.device_id);
        session.set_last_ip(info.ip);
        info!(
            "Found target {} at {} (hw {:#04x}, sw {:#04x})",
            info.device_id, info.ip, info.hw_version, info.sw_version
        );
        Ok(info)
    }

    /// Query the target's status with the current identity.
    pub fn status(&mut self) -> Result<DeviceInfo> {
        let response = self
            .executor
            .send_with_retry(Command::Stat, &[], RetryPolicy::COMMAND)?;
        Ok(DeviceInfo::from(Self::frame_of(&response)?))
    }

    /// Force the target onto `ip` and talk unicast from then on.
    pub fn force_ip(&mut self, ip: Ipv4Addr) -> Result<()> {
        self.force_ip_with(ip, RetryPolicy::FORCE_IP, true)
    }

    fn force_ip_with(&mut self, ip: Ipv4Addr, policy: RetryPolicy, unicast: bool) -> Result<()> {
        info!("Forcing target IP to {ip}");
        self.executor
            .send_with_retry(Command::SetIp, &ip.octets(), policy)?;
        self.executor.session_mut().set_last_ip(ip);
        if unicast {
            let addr = self.config.unicast_addr(ip);
            self.executor.set_destination(addr);
        }
        Ok(())
    }

    /// Hold the target in loader mode.
    pub fn capture(&mut self) -> Result<()> {
        self.capture_with(RetryPolicy::COMMAND)
    }

    fn capture_with(&mut self, policy: RetryPolicy) -> Result<()> {
        info!("Capturing loader");
        self.executor
            .send_with_retry(Command::Capture, &[], policy)
            .map(drop)
    }

    /// Erase target memory.
    pub fn erase(&mut self, kind: EraseKind) -> Result<()> {
        let command = kind.command();
        info!("Erasing ({command})...");
        self.single(command, &[])?;
        info!("Erase complete");
        Ok(())
    }

    /// Invalidate the user application so the loader stays resident.
    pub fn invalidate(&mut self) -> Result<()> {
        self.single(Command::Invalidate, &[]).map(drop)
    }

    /// Leave loader mode and restart the application.
    pub fn exit_loader(&mut self) -> Result<()> {
        info!("Leaving loader mode");
        self.single(Command::Reboot, &[]).map(drop)
    }

    /// Stream the target's memory back.
    pub fn dump(&mut self) -> DumpReport {
        crate::dump::collect(&mut self.executor)
    }

    /// Program every transmittable record of `image`.
    ///
    /// Returns the number of records sent. A record that exhausts its
    /// retries stops the upload; no later record is sent.
    pub fn upload<F>(&mut self, image: &FirmwareImage, mut progress: F) -> Result<usize>
    where
        F: FnMut(usize, usize),
    {
        let mut sent = 0;
        self.upload_with(image, RetryPolicy::COMMAND, &mut sent, &mut progress)?;
        Ok(sent)
    }

    fn upload_with(
        &mut self,
        image: &FirmwareImage,
        policy: RetryPolicy,
        sent: &mut usize,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        let total = image.transmitted().count();
        info!("Uploading {total} records");

        for record in image.transmitted() {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }
            debug!("Record line {}: {}", record.line, record.text);
            if let Err(e) = self
                .executor
                .send_with_retry(Command::Upload, record.as_payload(), policy)
            {
                error!("Record on line {} failed: {e}", record.line);
                return Err(e);
            }
            *sent += 1;
            progress(*sent, total);
        }
        Ok(())
    }

    /// Run the complete burn pipeline.
    ///
    /// The returned session records the last state reached, the error that
    /// stopped the burn (if any) and every diagnostic collected on the way.
    pub fn burn<F>(
        &mut self,
        image: &FirmwareImage,
        options: &ProgramOptions,
        mut progress: F,
    ) -> ProgramSession
    where
        F: FnMut(usize, usize),
    {
        let mut session = ProgramSession {
            target_ip: options.target_ip,
            ..Default::default()
        };

        match self.run_burn(image, options, &mut session, &mut progress) {
            Ok(()) => info!("Burn complete: {} records", session.records_sent),
            Err(e) => {
                self.executor.note(Diagnostic::new(
                    Severity::Error,
                    DiagnosticSource::Pipeline,
                    None,
                    format!("burn aborted after state '{}': {e}", session.state),
                ));
                session.last_error = Some(e);
            },
        }

        session.diagnostics = self.executor.take_diagnostics();
        session
    }

    fn run_burn(
        &mut self,
        image: &FirmwareImage,
        options: &ProgramOptions,
        session: &mut ProgramSession,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<()> {
        if options.reboot {
            self.trigger_reset(options.target_ip);
        }
        session.state = ProgramState::Rebooted;

        self.discover_with(options.command_retry)?;
        session.state = ProgramState::Discovered;

        match options.target_ip {
            Some(ip) if options.force_ip => {
                self.force_ip_with(ip, options.force_ip_retry, options.unicast_after_force)?;
            },
            _ => debug!("Skipping IP forcing"),
        }
        session.state = ProgramState::IpForced;

        self.capture_with(options.command_retry)?;
        session.captured_loader = true;
        session.state = ProgramState::LoaderCaptured;

        self.erase(EraseKind::All)?;
        session.erased = true;
        session.state = ProgramState::Erased;

        self.upload_with(image, options.command_retry, &mut session.records_sent, progress)?;
        session.state = ProgramState::Uploaded;

        self.exit_loader()?;
        session.state = ProgramState::Exited;
        Ok(())
    }

    /// Reset trigger failures are not fatal: the target may already sit in
    /// loader mode with its control port closed.
    fn trigger_reset(&mut self, target_ip: Option<Ipv4Addr>) {
        let Some(ip) = target_ip else {
            self.executor.note(Diagnostic::new(
                Severity::Warning,
                DiagnosticSource::Pipeline,
                None,
                "no target IP configured, reset trigger skipped",
            ));
            return;
        };

        if let Err(e) = self.reset_target(ip) {
            warn!("Reset trigger failed: {e}");
            self.executor.note(Diagnostic::new(
                Severity::Warning,
                DiagnosticSource::Transport,
                None,
                format!("reset trigger to {ip} failed: {e}"),
            ));
        }
    }

    fn single(&mut self, command: Command, payload: &[u8]) -> Result<Response> {
        let response = self.executor.send(command, payload);
        if response.error {
            return Err(Error::Rejected { command });
        }
        Ok(response)
    }

    fn frame_of(response: &Response) -> Result<&ResponseFrame> {
        response
            .frame
            .as_ref()
            .ok_or_else(|| Error::Protocol(format!("{} reply carried no frame", response.command)))
    }
}

impl Programmer<crate::transport::udp::UdpTransport> {
    /// Open a UDP transport for `config` and create a programmer on it.
    pub fn open(config: &NetConfig) -> Result<Self> {
        let transport = crate::transport::udp::UdpTransport::open(config)?;
        Ok(Self::new(transport, config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockTransport, reply_to};
    use std::net::SocketAddr;
    use std::time::Duration;

    const TARGET: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 42);

    const IMAGE: &str = "\
:020000040000FA
:10000000000102030405060708090A0B0C0D0E0F78
:020000021000EC
:0400000500000000F7
:00000001FF
";

    fn ok_reply(req: &[u8]) -> Vec<Option<Vec<u8>>> {
        vec![Some(reply_to(req, 0, 0, &[]))]
    }

    fn fast_options() -> ProgramOptions {
        ProgramOptions {
            force_ip_retry: RetryPolicy::new(5, Duration::ZERO),
            ..ProgramOptions::default().with_target_ip(TARGET)
        }
    }

    fn programmer(mock: MockTransport) -> Programmer<MockTransport> {
        let _ = env_logger::builder().is_test(true).try_init();
        Programmer::new(mock, NetConfig::default())
    }

    /// Reply to the n-th frame (0-based) with a timeout, everything else OK.
    fn drop_frames(dropped: Vec<usize>) -> MockTransport {
        let mut n = 0;
        MockTransport::with_responder(move |req| {
            let this = n;
            n += 1;
            if dropped.contains(&this) {
                vec![None]
            } else {
                ok_reply(req)
            }
        })
    }

    #[test]
    fn test_burn_end_to_end() {
        // First Stat times out, everything else succeeds.
        let mut p = programmer(drop_frames(vec![0]));
        let image = FirmwareImage::parse(IMAGE);
        let mut progress = Vec::new();

        let session = p.burn(&image, &fast_options(), |sent, total| progress.push((sent, total)));

        assert!(session.succeeded(), "{:?}", session.last_error);
        assert_eq!(session.state, ProgramState::Exited);
        assert!(session.captured_loader && session.erased);
        assert_eq!(session.records_sent, 3);
        assert_eq!(progress, [(1, 3), (2, 3), (3, 3)]);

        let transport_diags: Vec<_> = session
            .diagnostics
            .iter()
            .filter(|d| d.source == DiagnosticSource::Transport)
            .collect();
        assert_eq!(transport_diags.len(), 1);
        assert_eq!(transport_diags[0].command, Some(Command::Stat));

        let mock = p.executor().transport();
        assert_eq!(mock.triggers.len(), 1);
        assert_eq!(mock.triggers[0].0, SocketAddr::from((TARGET, 1000)));
        assert_eq!(mock.triggers[0].1, "~reset,sys");
        assert_eq!(mock.sent_commands(), [0, 0, 1, 3, 6, 4, 4, 4, 9]);
        assert_eq!(mock.payloads_of(1), [TARGET.octets().to_vec()]);
        assert!(mock.payloads_of(6)[0].is_empty());

        // Discovery used the wildcard, later frames the adopted identity.
        assert_eq!(&mock.sent[0].0[2..4], &[0x00, 0x00]);
        assert_eq!(&mock.sent[3].0[2..4], &[0x3c, 0x7e]);
        // Multicast until the IP is forced, unicast afterwards.
        assert_eq!(mock.sent[2].1, NetConfig::default().group_addr());
        assert_eq!(mock.sent[3].1, SocketAddr::from((TARGET, 16384)));
        assert_eq!(p.executor().session().seq(), 9);
    }

    #[test]
    fn test_upload_sends_only_types_0_1_4_in_order() {
        let mut p = programmer(MockTransport::with_responder(ok_reply));
        let image = FirmwareImage::parse(IMAGE);

        let sent = p.upload(&image, |_, _| {}).unwrap();
        assert_eq!(sent, 3);
        let payloads = p.executor().transport().payloads_of(4);
        assert_eq!(
            payloads,
            [
                b":020000040000FA".to_vec(),
                b":10000000000102030405060708090A0B0C0D0E0F78".to_vec(),
                b":00000001FF".to_vec(),
            ]
        );
    }

    #[test]
    fn test_upload_retry_exhaustion_stops_later_lines() {
        // The data record (second uploaded line) always fails with a checksum error.
        let mock = MockTransport::with_responder(|req| {
            if req[6] == 4 && req[7..].starts_with(b":10") {
                vec![Some(reply_to(req, 0x0040, 0, &[]))]
            } else {
                ok_reply(req)
            }
        });
        let mut p = programmer(mock);
        let image = FirmwareImage::parse(IMAGE);

        let session = p.burn(&image, &fast_options(), |_, _| {});
        assert!(!session.succeeded());
        assert_eq!(session.state, ProgramState::Erased);
        assert_eq!(session.records_sent, 1);
        assert!(matches!(
            session.last_error,
            Some(Error::RetryExhausted {
                command: Command::Upload,
                attempts: 4
            })
        ));

        let mock = p.executor().transport();
        let uploads = mock.payloads_of(4);
        assert_eq!(uploads.len(), 5);
        assert!(uploads.iter().all(|p| p.as_slice() != b":00000001FF"));
        assert!(!mock.sent_commands().contains(&9));
        assert_eq!(
            session.diagnostics.last().map(|d| d.source),
            Some(DiagnosticSource::Pipeline)
        );
    }

    #[test]
    fn test_discovery_failure_is_terminal() {
        let mut p = programmer(MockTransport::new());
        let session = p.burn(&FirmwareImage::parse(IMAGE), &fast_options(), |_, _| {});

        assert_eq!(session.state, ProgramState::Rebooted);
        assert!(matches!(
            session.last_error,
            Some(Error::RetryExhausted {
                command: Command::Stat,
                attempts: 4
            })
        ));
        assert_eq!(p.executor().transport().sent_commands(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_capture_rejection_aborts_before_erase() {
        let mock = MockTransport::with_responder(|req| {
            let status = if req[6] == 3 { 0x1000 } else { 0 };
            vec![Some(reply_to(req, status, 0, &[]))]
        });
        let mut p = programmer(mock);
        let session = p.burn(
            &FirmwareImage::parse(IMAGE),
            &fast_options().with_force_ip(false),
            |_, _| {},
        );

        assert_eq!(session.state, ProgramState::IpForced);
        assert!(!session.captured_loader);
        let sent = p.executor().transport().sent_commands();
        assert!(!sent.contains(&6));
        assert_eq!(sent.iter().filter(|&&c| c == 3).count(), 4);
    }

    #[test]
    fn test_erase_failure_aborts() {
        let mock = MockTransport::with_responder(|req| {
            if req[6] == 6 { vec![None] } else { ok_reply(req) }
        });
        let mut p = programmer(mock);
        let session = p.burn(&FirmwareImage::parse(IMAGE), &fast_options(), |_, _| {});

        assert_eq!(session.state, ProgramState::LoaderCaptured);
        assert!(matches!(
            session.last_error,
            Some(Error::Rejected {
                command: Command::EraseAll
            })
        ));
        assert!(!p.executor().transport().sent_commands().contains(&4));
    }

    #[test]
    fn test_refused_reset_trigger_is_a_warning() {
        let mut mock = MockTransport::with_responder(ok_reply);
        mock.refuse_trigger = true;
        let mut p = programmer(mock);

        let session = p.burn(&FirmwareImage::parse(IMAGE), &fast_options(), |_, _| {});
        assert!(session.succeeded());
        assert_eq!(session.diagnostics[0].severity, Severity::Warning);
        assert_eq!(session.diagnostics[0].source, DiagnosticSource::Transport);
    }

    #[test]
    fn test_burn_without_target_ip_skips_trigger_and_force() {
        let mut p = programmer(MockTransport::with_responder(ok_reply));
        let session = p.burn(&FirmwareImage::parse(IMAGE), &ProgramOptions::default(), |_, _| {});

        assert!(session.succeeded());
        let mock = p.executor().transport();
        assert!(mock.triggers.is_empty());
        assert!(!mock.sent_commands().contains(&1));
        assert!(mock.sent.iter().all(|(_, dest)| *dest == NetConfig::default().group_addr()));
    }

    #[test]
    fn test_force_ip_needs_final_success() {
        let mut n = 0;
        let mock = MockTransport::with_responder(move |req| {
            n += 1;
            if n < 5 { vec![None] } else { ok_reply(req) }
        });
        let mut p = programmer(mock);

        p.force_ip_with(TARGET, RetryPolicy::new(5, Duration::ZERO), true)
            .unwrap();
        assert_eq!(p.executor().transport().sent.len(), 5);
        assert_eq!(p.executor().session().last_ip(), Some(TARGET));
        assert_eq!(p.executor().destination(), SocketAddr::from((TARGET, 16384)));
    }

    #[test]
    fn test_force_ip_waits_a_second_between_attempts() {
        assert_eq!(ProgramOptions::default().force_ip_retry, RetryPolicy::FORCE_IP);

        let mut n = 0;
        let mock = MockTransport::with_responder(move |req| {
            n += 1;
            if n < 2 { vec![None] } else { ok_reply(req) }
        });
        let mut p = programmer(mock);

        let start = std::time::Instant::now();
        p.force_ip(TARGET).unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(p.executor().transport().sent_commands(), [1, 1]);
    }

    #[test]
    fn test_late_capture_reply_cannot_confirm_erase() {
        let mut captures = 0;
        let mock = MockTransport::with_responder(move |req| match req[6] {
            3 => {
                captures += 1;
                if captures == 1 {
                    vec![None, Some(reply_to(req, 0, 0, &[]))]
                } else {
                    ok_reply(req)
                }
            },
            _ => Vec::new(),
        });
        let mut p = programmer(mock);

        p.capture().unwrap();
        let err = p.erase(EraseKind::All).unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                command: Command::EraseAll
            }
        ));
    }

    #[test]
    fn test_status_uses_adopted_identity() {
        let mut p = programmer(MockTransport::with_responder(ok_reply));
        p.discover().unwrap();
        let info = p.status().unwrap();
        assert_eq!(info.device_id.to_string(), "3c7e");

        let executor = p.into_executor();
        let sent = &executor.transport().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(&sent[1].0[2..4], &[0x3c, 0x7e]);
        assert_eq!(executor.session().seq(), 2);
    }

    #[test]
    fn test_discover_adopts_identity() {
        let mut p = programmer(MockTransport::with_responder(ok_reply));
        let info = p.discover().unwrap();
        assert_eq!(info.device_id.to_string(), "3c7e");
        assert_eq!(info.ip, TARGET);
        assert_eq!(p.executor().session().id(), info.device_id);
    }

    #[test]
    fn test_erase_kinds() {
        assert_eq!(EraseKind::All.command(), Command::EraseAll);
        assert_eq!(EraseKind::Program.command(), Command::ErasePgm);
        assert_eq!(EraseKind::Eeprom.command(), Command::EraseEe);
    }
}

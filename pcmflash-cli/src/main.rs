//! pcmflash CLI - Command-line tool for reprogramming PCM targets over the network.
//!
//! ## Features
//!
//! - Discover targets on the LIA multicast group
//! - Burn Intel-HEX firmware images
//! - Erase, dump, reset and re-address targets
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use pcmflash::{Command, DeviceId, NetConfig};
use std::env;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

mod commands;
mod config;

use config::Config;

/// User-facing CLI failures with their own exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation or missing setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Configuration problem (exit code 3).
    #[error("{0}")]
    Config(String),
    /// The user declined or interrupted the operation (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

const EXAMPLES: &str = "\
Examples:
  pcmflash discover
  pcmflash --target 10.0.0.42 burn firmware.hex
  pcmflash info firmware.hex --json";

/// pcmflash - Reprogram PCM targets over UDP multicast.
///
/// Environment variables:
///   PCMFLASH_TARGET            - Target IP address
///   PCMFLASH_INTERFACE         - Local interface address
///   PCMFLASH_GROUP             - Multicast group (default: 230.10.10.11)
///   PCMFLASH_PORT              - LIA UDP port (default: 16384)
///   PCMFLASH_DEVICE_ID         - Known device id (skips discovery)
///   PCMFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "pcmflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = EXAMPLES)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// IP address the target uses (or should be forced to).
    #[arg(short, long, global = true, env = "PCMFLASH_TARGET")]
    target: Option<Ipv4Addr>,

    /// Local interface address to send and join the group on.
    #[arg(short, long, global = true, env = "PCMFLASH_INTERFACE")]
    interface: Option<Ipv4Addr>,

    /// Multicast group.
    #[arg(long, global = true, env = "PCMFLASH_GROUP")]
    group: Option<Ipv4Addr>,

    /// LIA UDP port.
    #[arg(long, global = true, env = "PCMFLASH_PORT")]
    port: Option<u16>,

    /// TCP control port for the reset trigger.
    #[arg(long, global = true)]
    control_port: Option<u16>,

    /// Known device id (4 hex digits); skips discovery.
    #[arg(short, long, global = true, env = "PCMFLASH_DEVICE_ID")]
    device_id: Option<DeviceId>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "PCMFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Answer yes to confirmation prompts.
    #[arg(short, long, global = true)]
    yes: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Find a target and show its identity.
    Discover {
        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Burn a firmware image (reset, discover, force IP, capture, erase, upload, exit).
    Burn {
        /// Path to the Intel-HEX image.
        image: PathBuf,

        /// Skip record checksum verification.
        #[arg(long)]
        skip_verify: bool,

        /// Do not send the reset trigger first.
        #[arg(long)]
        no_reboot: bool,

        /// Do not force the target IP address.
        #[arg(long)]
        no_force_ip: bool,
    },

    /// Erase target memory (captures the loader first).
    Erase {
        /// Erase program memory only.
        #[arg(long, group = "region")]
        program: bool,

        /// Erase EEPROM only.
        #[arg(long, group = "region")]
        eeprom: bool,

        /// Erase program memory and EEPROM.
        #[arg(long, group = "region")]
        all: bool,
    },

    /// Dump target memory to a file (captures the loader first).
    Dump {
        /// Output file.
        output: PathBuf,
    },

    /// Send the reset trigger to the running application.
    Reset,

    /// Leave loader mode and restart the application.
    ExitLoader,

    /// Invalidate the application so the loader stays resident.
    Invalidate,

    /// Force the target onto an IP address.
    SetIp {
        /// Address to assign.
        ip: Ipv4Addr,
    },

    /// Show information about a firmware image.
    Info {
        /// Path to the Intel-HEX image.
        image: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    init_logging(&cli);

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    pcmflash::set_interrupt_checker(was_interrupted);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "pcmflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = if let Some(ref path) = cli.config_path {
        if !path.exists() {
            return Err(
                CliError::Config(format!("config file {} does not exist", path.display())).into(),
            );
        }
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Discover { json } => commands::target::cmd_discover(cli, &mut config, *json),
        Commands::Burn {
            image,
            skip_verify,
            no_reboot,
            no_force_ip,
        } => commands::burn::cmd_burn(
            cli,
            &config,
            image,
            commands::burn::BurnFlags {
                skip_verify: *skip_verify || config.burn.skip_verify,
                no_reboot: *no_reboot || config.burn.no_reboot,
                no_force_ip: *no_force_ip || config.burn.no_force_ip,
            },
        ),
        Commands::Erase {
            program,
            eeprom,
            all,
        } => {
            let kind = commands::target::erase_kind(*program, *eeprom, *all)?;
            commands::target::cmd_erase(cli, &config, kind)
        },
        Commands::Dump { output } => commands::dump::cmd_dump(cli, &config, output),
        Commands::Reset => commands::target::cmd_reset(cli, &config),
        Commands::ExitLoader => commands::target::cmd_exit_loader(cli, &config),
        Commands::Invalidate => commands::target::cmd_invalidate(cli, &config),
        Commands::SetIp { ip } => commands::target::cmd_set_ip(cli, &config, *ip),
        Commands::Info { image, json } => commands::info::cmd_info(image, *json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Network settings: CLI/env first, then config files, then defaults.
fn net_config(cli: &Cli, config: &Config) -> NetConfig {
    let net = &config.network;
    let mut nc = NetConfig::new(
        cli.interface
            .or(net.interface)
            .unwrap_or(Ipv4Addr::UNSPECIFIED),
    );
    if let Some(group) = cli.group.or(net.group) {
        nc = nc.with_group(group);
    }
    if let Some(port) = cli.port.or(net.port) {
        nc = nc.with_port(port);
    }
    if let Some(port) = cli.control_port.or(net.control_port) {
        nc = nc.with_control_port(port);
    }
    if let Some(ttl) = net.ttl {
        nc.ttl = ttl;
    }
    nc
}

fn target_ip(cli: &Cli, config: &Config) -> Option<Ipv4Addr> {
    cli.target.or(config.target.ip)
}

fn device_id(cli: &Cli, config: &Config) -> Option<DeviceId> {
    cli.device_id.or(config.target.device_id)
}

/// Map an error to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<pcmflash::Error>() {
        Some(pcmflash::Error::Interrupted) => 130,
        Some(pcmflash::Error::RetryExhausted {
            command: Command::Stat,
            ..
        }) => 4,
        _ => 1,
    }
}

//! Command implementations.
//!
//! Each group of subcommands is implemented in its own module; the helpers
//! here open the network session and handle confirmation prompts.

pub(crate) mod burn;
pub(crate) mod completions;
pub(crate) mod dump;
pub(crate) mod info;
pub(crate) mod target;

use {
    crate::{Cli, CliError, config::Config},
    anyhow::{Context, Result},
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, theme::ColorfulTheme},
    log::debug,
    pcmflash::{Diagnostic, Programmer, Severity, UdpTransport},
    std::io::IsTerminal,
};

/// Open the UDP transport described by the CLI and config.
pub(crate) fn open_programmer(cli: &Cli, config: &Config) -> Result<Programmer<UdpTransport>> {
    let net = crate::net_config(cli, config);
    debug!(
        "Opening LIA socket on {} (group {}:{})",
        net.interface, net.group, net.port
    );
    Programmer::open(&net).with_context(|| {
        format!(
            "Failed to open UDP socket on interface {} for group {}",
            net.interface, net.group
        )
    })
}

/// Open the transport and learn the target identity.
///
/// A configured device id is used as-is; otherwise the target is discovered.
pub(crate) fn connect(cli: &Cli, config: &Config) -> Result<Programmer<UdpTransport>> {
    let mut programmer = open_programmer(cli, config)?;

    if let Some(id) = crate::device_id(cli, config) {
        debug!("Using configured device id {id}");
        programmer
            .executor_mut()
            .session_mut()
            .adopt_id(id);
        return Ok(programmer);
    }

    if !cli.quiet {
        eprintln!("{} Searching for target...", style("⏳").yellow());
    }
    let info = programmer
        .discover()
        .context("No target answered the discovery request")?;
    if !cli.quiet {
        eprintln!(
            "{} Found target {} at {}",
            style("✓").green(),
            style(info.device_id).cyan(),
            info.ip
        );
    }
    Ok(programmer)
}

/// Ask the user to confirm a destructive operation.
pub(crate) fn confirm(cli: &Cli, prompt: &str) -> Result<()> {
    if cli.yes {
        return Ok(());
    }
    if cli.non_interactive {
        return Err(CliError::Usage(format!(
            "'{prompt}' needs confirmation; pass --yes in non-interactive mode"
        ))
        .into());
    }
    ensure_interactive_terminal()?;

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(())
    } else {
        Err(CliError::Cancelled("Operation cancelled".to_string()).into())
    }
}

/// Whether prompts can be shown at all.
pub(crate) fn can_prompt(cli: &Cli) -> bool {
    !cli.non_interactive && std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Usage(
            "confirmation requires an interactive terminal; pass --yes".to_string(),
        )
        .into())
    }
}

pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Prompt cancelled".to_string()).into()
            } else {
                CliError::Usage(format!("Prompt failed: {io_err}")).into()
            }
        },
    }
}

/// Print warnings and errors collected during an operation.
pub(crate) fn report_diagnostics(cli: &Cli, diagnostics: &[Diagnostic]) {
    if cli.quiet {
        return;
    }
    for d in diagnostics
        .iter()
        .filter(|d| matches!(d.severity, Severity::Error | Severity::Warning))
    {
        let marker = match d.severity {
            Severity::Error => style("✗").red(),
            _ => style("⚠").yellow(),
        };
        eprintln!("  {marker} {d}");
    }
}

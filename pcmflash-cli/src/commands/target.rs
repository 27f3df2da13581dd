//! Standalone target commands: discover, reset, erase, exit-loader,
//! invalidate and set-ip.

use {
    super::{can_prompt, confirm, connect, map_prompt_error, open_programmer},
    crate::{Cli, CliError, config::Config},
    anyhow::{Context, Result},
    console::style,
    dialoguer::{Confirm, theme::ColorfulTheme},
    pcmflash::{DeviceInfo, EraseKind, protocol::classify},
    std::net::Ipv4Addr,
};

/// Discover command implementation.
pub(crate) fn cmd_discover(cli: &Cli, config: &mut Config, json: bool) -> Result<()> {
    let mut programmer = open_programmer(cli, config)?;
    if !cli.quiet && !json {
        eprintln!("{} Searching for target...", style("⏳").yellow());
    }
    let info = programmer
        .discover()
        .context("No target answered the discovery request")?;
    programmer.close();

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": info,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_device(&info);

    if config.target.device_id != Some(info.device_id) && can_prompt(cli) {
        ask_remember_target(&info, config)?;
    }
    Ok(())
}

fn print_device(info: &DeviceInfo) {
    eprintln!("\n{}", style("Target").bold().underlined());
    eprintln!("  Device id:  {}", style(info.device_id).cyan().bold());
    eprintln!("  IP address: {}", info.ip);
    eprintln!("  Protocol:   {}", info.protocol_id);
    eprintln!("  Hardware:   {:#04x}", info.hw_version);
    eprintln!("  Software:   {:#04x}", info.sw_version);
    eprintln!("  Status:     {:#06x}", info.status_word);
    for entry in classify(info.status_word).messages {
        eprintln!("    {} {}", style("•").dim(), entry.text);
    }
}

fn ask_remember_target(info: &DeviceInfo, config: &mut Config) -> Result<()> {
    let remember = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Remember target {} ({}) in {}?",
            info.device_id,
            info.ip,
            crate::config::LOCAL_CONFIG
        ))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if remember {
        let path = config.remember_target(info.ip, info.device_id)?;
        eprintln!("{} Saved to {}", style("✓").green(), path.display());
    }
    Ok(())
}

/// Reset command implementation.
pub(crate) fn cmd_reset(cli: &Cli, config: &Config) -> Result<()> {
    let ip = require_target(cli, config)?;
    let mut programmer = open_programmer(cli, config)?;
    programmer
        .reset_target(ip)
        .with_context(|| format!("Reset trigger to {ip} failed"))?;
    programmer.close();

    if !cli.quiet {
        eprintln!("{} Reset trigger sent to {ip}", style("✓").green());
    }
    Ok(())
}

/// Map the erase flags to a region.
pub(crate) fn erase_kind(program: bool, eeprom: bool, all: bool) -> Result<EraseKind> {
    match (program, eeprom, all) {
        (true, false, false) => Ok(EraseKind::Program),
        (false, true, false) => Ok(EraseKind::Eeprom),
        (false, false, true) => Ok(EraseKind::All),
        _ => Err(CliError::Usage(
            "choose what to erase with --program, --eeprom or --all".to_string(),
        )
        .into()),
    }
}

/// Erase command implementation.
pub(crate) fn cmd_erase(cli: &Cli, config: &Config, kind: EraseKind) -> Result<()> {
    confirm(cli, &format!("Erase target memory ({})?", kind.command()))?;

    let mut programmer = connect(cli, config)?;
    programmer.capture().context("Could not capture the loader")?;

    if !cli.quiet {
        eprintln!("{} Erasing ({})...", style("🗑").red(), kind.command());
    }
    let result = programmer.erase(kind);
    programmer.close();
    result?;

    if !cli.quiet {
        eprintln!("\n{} Erase completed", style("✓").green().bold());
    }
    Ok(())
}

/// Exit-loader command implementation.
pub(crate) fn cmd_exit_loader(cli: &Cli, config: &Config) -> Result<()> {
    let mut programmer = connect(cli, config)?;
    let result = programmer.exit_loader();
    programmer.close();
    result?;

    if !cli.quiet {
        eprintln!("{} Loader left, application restarting", style("✓").green());
    }
    Ok(())
}

/// Invalidate command implementation.
pub(crate) fn cmd_invalidate(cli: &Cli, config: &Config) -> Result<()> {
    confirm(cli, "Invalidate the application on the target?")?;

    let mut programmer = connect(cli, config)?;
    let result = programmer.invalidate();
    programmer.close();
    result?;

    if !cli.quiet {
        eprintln!("{} Application invalidated", style("✓").green());
    }
    Ok(())
}

/// Set-ip command implementation.
pub(crate) fn cmd_set_ip(cli: &Cli, config: &Config, ip: Ipv4Addr) -> Result<()> {
    let mut programmer = connect(cli, config)?;
    let result = programmer
        .force_ip(ip)
        .with_context(|| format!("Target did not accept IP {ip}"));
    programmer.close();
    result?;

    if !cli.quiet {
        eprintln!("{} Target now uses {ip}", style("✓").green());
    }
    Ok(())
}

fn require_target(cli: &Cli, config: &Config) -> Result<Ipv4Addr> {
    crate::target_ip(cli, config).ok_or_else(|| {
        CliError::Usage("no target IP; pass --target or set [target] ip".to_string()).into()
    })
}

//! Burn command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pcmflash::{FirmwareImage, ProgramOptions, ProgramState};
use std::path::Path;

use super::{confirm, open_programmer, report_diagnostics};
use crate::config::Config;
use crate::{Cli, CliError, use_fancy_output, was_interrupted};

/// Burn switches after merging CLI flags and config defaults.
#[derive(Debug, Clone, Copy, Default)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct BurnFlags {
    pub skip_verify: bool,
    pub no_reboot: bool,
    pub no_force_ip: bool,
}

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Build pipeline options from the flags and the configured target.
pub(crate) fn program_options(
    flags: BurnFlags,
    target_ip: Option<std::net::Ipv4Addr>,
) -> ProgramOptions {
    let mut options = ProgramOptions::default()
        .with_reboot(!flags.no_reboot)
        .with_force_ip(!flags.no_force_ip);
    options.target_ip = target_ip;
    options
}

/// Burn command implementation.
pub(crate) fn cmd_burn(
    cli: &Cli,
    config: &Config,
    image_path: &Path,
    flags: BurnFlags,
) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading image {}",
            style("📦").cyan(),
            image_path.display()
        );
    }

    let image = FirmwareImage::from_file(image_path)
        .with_context(|| format!("Failed to load image {}", image_path.display()))?;

    if !flags.skip_verify {
        image.verify().context("Image verification failed")?;
        if !cli.quiet {
            eprintln!("{} Record checksums verified", style("✓").green());
        }
    }

    let summary = image.summary();
    if summary.transmitted == 0 {
        return Err(CliError::Usage(format!(
            "{} has no records to upload",
            image_path.display()
        ))
        .into());
    }
    if !cli.quiet {
        eprintln!(
            "{} {} records to upload, {} skipped",
            style("ℹ").blue(),
            summary.transmitted,
            summary.skipped
        );
    }

    let target_ip = crate::target_ip(cli, config);
    if target_ip.is_none() && !cli.quiet {
        eprintln!(
            "{} No target IP set: reset trigger and IP forcing are skipped",
            style("⚠").yellow()
        );
    }

    confirm(cli, "Erase and reprogram the target?")?;

    let options = program_options(flags, target_ip);
    let mut programmer = open_programmer(cli, config)?;

    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(summary.transmitted as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.set_message("uploading");
        pb
    };

    let session = programmer.burn(&image, &options, |sent, _total| {
        pb.set_position(sent as u64);
    });
    programmer.close();

    report_diagnostics(cli, &session.diagnostics);

    if !session.succeeded() {
        pb.abandon_with_message("failed");
        let state = session.state;
        let sent = session.records_sent;
        let result = session.into_result();
        if was_interrupted() {
            return Err(CliError::Cancelled("Burn interrupted".to_string()).into());
        }
        return result
            .map(drop)
            .with_context(|| burn_failure_context(state, sent));
    }

    pb.finish_with_message("done");
    if !cli.quiet {
        eprintln!(
            "\n{} Burn completed: {} records programmed",
            style("🎉").green().bold(),
            session.records_sent
        );
    }
    Ok(())
}

fn burn_failure_context(state: ProgramState, records_sent: usize) -> String {
    match state {
        ProgramState::Erased => format!(
            "Upload failed after {records_sent} records; \
             the target is erased and still in loader mode"
        ),
        ProgramState::Uploaded => {
            "Image programmed, but the target did not leave loader mode".to_string()
        },
        _ => format!("Burn stopped after state '{state}'"),
    }
}

//! Dump command implementation.

use {
    super::{connect, report_diagnostics},
    crate::{Cli, config::Config},
    anyhow::{Context, Result},
    console::style,
    std::{fs::File, io::BufWriter, path::Path},
};

/// Capture the loader, stream the dump and write it to `output`.
///
/// Lines received before a failure are still written.
pub(crate) fn cmd_dump(cli: &Cli, config: &Config, output: &Path) -> Result<()> {
    let mut programmer = connect(cli, config)?;
    programmer.capture().context("Could not capture the loader")?;

    if !cli.quiet {
        eprintln!("{} Dumping target memory...", style("⏳").yellow());
    }
    let report = programmer.dump();
    programmer.close();

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    report
        .write_to(BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", output.display()))?;

    report_diagnostics(cli, &report.diagnostics);

    if let Some(err) = report.error {
        return Err(err).with_context(|| {
            format!(
                "Dump incomplete: {} packets written to {}",
                report.lines.len(),
                output.display()
            )
        });
    }

    if !cli.quiet {
        eprintln!(
            "{} {} packets written to {}",
            style("✓").green(),
            report.lines.len(),
            output.display()
        );
    }
    Ok(())
}

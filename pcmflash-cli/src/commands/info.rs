//! Image info command implementation.

use {
    anyhow::{Context, Result},
    console::style,
    pcmflash::{FirmwareImage, ImageSummary},
    std::path::Path,
};

/// Name of an Intel-HEX record type.
fn record_type_name(record_type: u8) -> &'static str {
    match record_type {
        0x00 => "Data",
        0x01 => "End Of File",
        0x02 => "Extended Segment Address",
        0x03 => "Start Segment Address",
        0x04 => "Extended Linear Address",
        0x05 => "Start Linear Address",
        _ => "Unknown",
    }
}

/// Info command implementation.
pub(crate) fn cmd_info(image_path: &Path, json: bool) -> Result<()> {
    if json {
        return cmd_info_json(image_path);
    }

    eprintln!(
        "{} Loading image {}",
        style("📦").cyan(),
        image_path.display()
    );

    let image = FirmwareImage::from_file(image_path)
        .with_context(|| format!("Failed to load image {}", image_path.display()))?;
    let summary = image.summary();
    let verification = image.verify();

    eprintln!("\n{}", style("Image Information").bold().underlined());
    eprintln!("  Lines:       {}", summary.lines);
    eprintln!("  To upload:   {}", summary.transmitted);
    eprintln!("  Skipped:     {}", summary.skipped);
    match &verification {
        Ok(()) => eprintln!("  Checksums:   {}", style("valid").green()),
        Err(e) => eprintln!("  Checksums:   {} ({e})", style("invalid").red()),
    }

    eprintln!("\n{}", style("Record Types").bold().underlined());
    for (record_type, count) in &summary.by_type {
        let marker = if pcmflash::image::hex::TRANSMITTED_TYPES.contains(record_type) {
            style("sent").green()
        } else {
            style("skipped").dim()
        };
        eprintln!(
            "  [{record_type:02X}] {:<26} {count:>6}  {marker}",
            record_type_name(*record_type)
        );
    }

    Ok(())
}

/// Info command --json output: structured JSON to stdout.
fn cmd_info_json(image_path: &Path) -> Result<()> {
    let image = FirmwareImage::from_file(image_path)
        .with_context(|| format!("Failed to load image {}", image_path.display()))?;
    let verification = image.verify();

    let output = serde_json::json!({
        "ok": true,
        "data": info_json(&image.summary(), verification.as_ref().err().map(ToString::to_string)),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn info_json(summary: &ImageSummary, verify_error: Option<String>) -> serde_json::Value {
    let records: Vec<serde_json::Value> = summary
        .by_type
        .iter()
        .map(|(record_type, count)| {
            serde_json::json!({
                "type": record_type,
                "name": record_type_name(*record_type),
                "count": count,
                "transmitted": pcmflash::image::hex::TRANSMITTED_TYPES.contains(record_type),
            })
        })
        .collect();

    serde_json::json!({
        "lines": summary.lines,
        "transmitted": summary.transmitted,
        "skipped": summary.skipped,
        "checksums_valid": verify_error.is_none(),
        "verify_error": verify_error,
        "records": records,
    })
}

//! Export of readings and usage reports
//!
//! Provides simple, testable export with proper error handling.

use anyhow::{Context, Result};
use meterwise_types::Reading;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::analytics::UsageReport;

/// Timestamp format of the CSV `Date` column (UTC)
const CSV_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

/// Export readings to CSV
///
/// CSV columns: Date, Reading (kWh)
/// Rows sorted chronologically (oldest first), dates in UTC.
///
/// # Errors
/// Returns error if file creation or write operations fail
///
/// # Examples
///
/// ```no_run
/// use meterwise_core::export::export_readings_to_csv;
/// use std::path::Path;
///
/// export_readings_to_csv(&[], Path::new("readings.csv")).unwrap();
/// ```
pub fn export_readings_to_csv(readings: &[Reading], path: &Path) -> Result<()> {
    ensure_parent(path)?;

    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    let mut writer = BufWriter::new(file);

    writeln!(writer, "Date,Reading (kWh)").context("Failed to write CSV header")?;

    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    for reading in sorted {
        writeln!(
            writer,
            "{},{}",
            reading.timestamp.format(CSV_DATE_FORMAT),
            reading.value
        )
        .with_context(|| format!("Failed to write row for reading {}", reading.id))?;
    }

    writer.flush().context("Failed to flush CSV writer")?;

    Ok(())
}

/// Export readings to JSON (same shape as the store, chronological)
pub fn export_readings_to_json(readings: &[Reading], path: &Path) -> Result<()> {
    ensure_parent(path)?;

    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let json =
        serde_json::to_string_pretty(&sorted).context("Failed to serialize readings to JSON")?;

    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON file: {}", path.display()))?;

    Ok(())
}

/// Export a usage report to JSON
pub fn export_report_to_json(report: &UsageReport, path: &Path) -> Result<()> {
    ensure_parent(path)?;

    let json =
        serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON file: {}", path.display()))?;

    Ok(())
}

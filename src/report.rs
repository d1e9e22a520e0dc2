//! Sweep records for downstream tools
//!
//! One [`SweepRecord`] per parameter carries the means of both variants, the
//! relative cost of enforcement and the fidelity figures. Records are written
//! as a JSON array, as JSON Lines, or as a plain-text table for the terminal.

use std::fmt::Write as _;
use std::io::{BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compare::RelativeIncrease;
use crate::measurement::MeasurementSummary;
use crate::sweep::{SweepOutcome, SweepRow, VariantResult};
use crate::{Error, Result};

/// Output format for sweep records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// One pretty-printed JSON array
    Json,
    /// One JSON object per line
    #[default]
    Jsonl,
    /// Human-readable table
    Table,
}

impl std::str::FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" => Ok(Self::Jsonl),
            "table" => Ok(Self::Table),
            other => Err(Error::Configuration(format!(
                "unknown report format '{other}' (expected json, jsonl or table)"
            ))),
        }
    }
}

/// Variant figures kept in a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantFigures {
    /// Timing and memory means, without captured outputs
    pub summary: MeasurementSummary,
    /// Mean edit distance to the expected sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_edit_distance: Option<f64>,
    /// Mean relative edit rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_relative_edit_rate: Option<f64>,
    /// Mean scheduler delays per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_delays: Option<f64>,
    /// Mean scheduler calls per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_calls: Option<f64>,
}

impl From<&VariantResult> for VariantFigures {
    fn from(result: &VariantResult) -> Self {
        let mut summary = result.summary.clone();
        summary.captured_outputs = None;
        Self {
            summary,
            mean_edit_distance: result.fidelity.as_ref().map(|f| f.mean_edit_distance),
            mean_relative_edit_rate: result.fidelity.as_ref().map(|f| f.mean_relative_edit_rate),
            mean_delays: result.scheduler.as_ref().map(|s| s.mean_delays),
            mean_calls: result.scheduler.as_ref().map(|s| s.mean_calls),
        }
    }
}

/// One parameter of a sweep, flattened for hand-off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRecord {
    /// Sweep the record belongs to
    pub run_id: Uuid,
    /// Sweep parameter
    pub parameter: u64,
    /// Plain variant
    pub plain: VariantFigures,
    /// Enforced variant
    pub enforced: VariantFigures,
    /// Cost of enforcement in percent
    pub relative_increase: RelativeIncrease,
}

impl SweepRecord {
    /// Flatten one sweep row
    #[must_use]
    pub fn from_row(run_id: Uuid, row: &SweepRow) -> Self {
        Self {
            run_id,
            parameter: row.parameter,
            plain: VariantFigures::from(&row.plain),
            enforced: VariantFigures::from(&row.enforced),
            relative_increase: row.comparison().relative_increase(),
        }
    }
}

/// Records for every completed row of a sweep
#[must_use]
pub fn records(outcome: &SweepOutcome) -> Vec<SweepRecord> {
    outcome
        .rows
        .iter()
        .map(|row| SweepRecord::from_row(outcome.run_id, row))
        .collect()
}

/// Write records as JSON Lines
///
/// # Errors
///
/// Returns an error if serialization or writing fails
pub fn write_jsonl<W: Write>(mut writer: W, records: &[SweepRecord]) -> Result<()> {
    for record in records {
        let line = serde_json::to_string(record)?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read JSON Lines records, skipping blank lines
///
/// # Errors
///
/// Returns [`Error::Serialization`] naming the first line that is not a record
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Vec<SweepRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| Error::Serialization(format!("line {}: {e}", index + 1)))?;
        records.push(record);
    }
    Ok(records)
}

/// Write records to a file in the given format
///
/// # Errors
///
/// Returns an error if the file cannot be written
pub fn export(records: &[SweepRecord], path: &Path, format: ReportFormat) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    match format {
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut file, records)?;
            writeln!(file)?;
        }
        ReportFormat::Jsonl => write_jsonl(&mut file, records)?,
        ReportFormat::Table => file.write_all(format_table(records).as_bytes())?,
    }
    file.flush()?;
    tracing::info!(path = %path.display(), records = records.len(), "report written");
    Ok(())
}

/// Load records written as a JSON array or as JSON Lines
///
/// # Errors
///
/// Returns an error if the file cannot be read or holds no valid records
pub fn load(path: &Path) -> Result<Vec<SweepRecord>> {
    let content = std::fs::read_to_string(path)?;
    if let Ok(records) = serde_json::from_str::<Vec<SweepRecord>>(&content) {
        return Ok(records);
    }
    read_jsonl(content.as_bytes())
}

/// Render records as an aligned text table
#[must_use]
pub fn format_table(records: &[SweepRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>9}  {:>10}  {:>10}  {:>8}  {:>10}  {:>10}  {:>8}  {:>9}  {:>9}",
        "parameter",
        "user plain",
        "user enf.",
        "Δ user %",
        "rss plain",
        "rss enf.",
        "Δ rss %",
        "edits pl.",
        "edits enf."
    );
    for record in records {
        let _ = writeln!(
            out,
            "{:>9}  {:>10.4}  {:>10.4}  {:>8}  {:>10.0}  {:>10.0}  {:>8}  {:>9}  {:>9}",
            record.parameter,
            record.plain.summary.mean_user_time_seconds,
            record.enforced.summary.mean_user_time_seconds,
            optional(record.relative_increase.user_time, 1),
            record.plain.summary.mean_peak_resident_kb,
            record.enforced.summary.mean_peak_resident_kb,
            optional(record.relative_increase.peak_resident, 1),
            optional(record.plain.mean_edit_distance, 2),
            optional(record.enforced.mean_edit_distance, 2),
        );
    }
    out
}

fn optional(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

//! GNU `time` resource-usage source
//!
//! The target runs under `/usr/bin/time -f "TimeStats(%e,%U,%S,%M)"`, which
//! appends one tagged record to stderr: elapsed seconds, user seconds, system
//! seconds and maximum resident set size in KB.

use std::time::Duration;

use crate::{Error, Result};

use super::{
    run_to_completion, MemoryReading, MemorySource, TargetCommand, Telemetry, TimingReading,
    TimingSource,
};

const SOURCE_NAME: &str = "GNU time";

const TAG_OPEN: &str = "TimeStats(";
const FORMAT: &str = "TimeStats(%e,%U,%S,%M)";

/// All four values of one `TimeStats(...)` record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStats {
    /// Elapsed wall-clock seconds (`%e`)
    pub real_seconds: f64,
    /// User-mode seconds (`%U`)
    pub user_seconds: f64,
    /// Kernel-mode seconds (`%S`)
    pub sys_seconds: f64,
    /// Maximum resident set size in KB (`%M`)
    pub peak_resident_kb: f64,
}

/// Resource-usage source wrapping the target in GNU `time`
#[derive(Debug, Clone)]
pub struct GnuTimeSource {
    /// Path to GNU time (default: "/usr/bin/time", not the shell builtin)
    program: String,
}

impl Default for GnuTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GnuTimeSource {
    /// Create a source using `/usr/bin/time`
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "/usr/bin/time".to_string(),
        }
    }

    /// Create a source with a custom GNU time binary
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check if GNU time is available
    #[must_use]
    pub fn is_available(&self) -> bool {
        super::is_available(&self.program)
    }

    /// Run the target once and read the full record
    ///
    /// # Errors
    ///
    /// Returns [`Error::TelemetryParse`] if no record was printed, or a spawn
    /// or timeout error from running the wrapper
    pub fn measure(
        &self,
        command: &TargetCommand,
        timeout: Option<Duration>,
    ) -> Result<Telemetry<TimeStats>> {
        let output =
            run_to_completion(command.wrapped_in(&self.program, &["-f", FORMAT]), timeout)?;
        let reading = parse_time_stats(&output.stderr)?;
        Ok(Telemetry {
            reading,
            exit_code: output.exit_code,
        })
    }
}

impl MemorySource for GnuTimeSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn measure_memory(
        &self,
        command: &TargetCommand,
        timeout: Option<Duration>,
    ) -> Result<Telemetry<MemoryReading>> {
        let telemetry = self.measure(command, timeout)?;
        Ok(Telemetry {
            reading: MemoryReading {
                peak_resident_kb: telemetry.reading.peak_resident_kb,
            },
            exit_code: telemetry.exit_code,
        })
    }
}

impl TimingSource for GnuTimeSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn measure_timing(
        &self,
        command: &TargetCommand,
        timeout: Option<Duration>,
    ) -> Result<Telemetry<TimingReading>> {
        let telemetry = self.measure(command, timeout)?;
        Ok(Telemetry {
            reading: TimingReading {
                real_seconds: telemetry.reading.real_seconds,
                user_seconds: telemetry.reading.user_seconds,
                sys_seconds: telemetry.reading.sys_seconds,
            },
            exit_code: telemetry.exit_code,
        })
    }
}

/// Parse the first `TimeStats(e,U,S,M)` record in GNU time output
///
/// # Errors
///
/// Returns [`Error::TelemetryParse`] if no tag is present or the tagged group
/// does not hold exactly four numbers
pub fn parse_time_stats(text: &str) -> Result<TimeStats> {
    let fields = tagged_group(text).ok_or_else(|| parse_error("no TimeStats(...) record in output"))?;

    let values = fields
        .split(',')
        .map(|field| field.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| parse_error(&format!("non-numeric field in TimeStats({fields}): {e}")))?;

    match values.as_slice() {
        &[real_seconds, user_seconds, sys_seconds, peak_resident_kb] => Ok(TimeStats {
            real_seconds,
            user_seconds,
            sys_seconds,
            peak_resident_kb,
        }),
        other => Err(parse_error(&format!(
            "expected 4 fields in TimeStats(...), found {}",
            other.len()
        ))),
    }
}

/// Contents of the first `TimeStats(` ... `)` group with a non-empty body
fn tagged_group(text: &str) -> Option<&str> {
    text.match_indices(TAG_OPEN).find_map(|(idx, _)| {
        let body_start = idx + TAG_OPEN.len();
        let rest = &text[body_start..];
        let body_len = rest.find(')')?;
        (body_len > 0).then(|| &rest[..body_len])
    })
}

fn parse_error(message: &str) -> Error {
    Error::TelemetryParse {
        source_name: SOURCE_NAME.to_string(),
        message: message.to_string(),
    }
}

//! `perf stat` timing source
//!
//! `perf stat` prints a counter table to stderr after the wrapped command
//! exits. Only its three trailing time lines are read:
//!
//! ```text
//!        0.251734032 seconds time elapsed
//!
//!        0.195093000 seconds user
//!        0.056427000 seconds sys
//! ```

use std::time::Duration;

use crate::{Error, Result};

use super::{
    decimal_ending_at, run_to_completion, TargetCommand, Telemetry, TimingReading, TimingSource,
};

const SOURCE_NAME: &str = "perf stat";

const ELAPSED_PHRASE: &str = " seconds time elapsed";
const USER_PHRASE: &str = " seconds user";
const SYS_PHRASE: &str = " seconds sys";

/// Timing source wrapping the target in `perf stat`
#[derive(Debug, Clone)]
pub struct PerfStatSource {
    /// Path to the perf binary (default: "perf")
    program: String,
}

impl Default for PerfStatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PerfStatSource {
    /// Create a source using `perf` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "perf".to_string(),
        }
    }

    /// Create a source with a custom perf binary
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check if perf is available
    #[must_use]
    pub fn is_available(&self) -> bool {
        super::is_available(&self.program)
    }
}

impl TimingSource for PerfStatSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn measure_timing(
        &self,
        command: &TargetCommand,
        timeout: Option<Duration>,
    ) -> Result<Telemetry<TimingReading>> {
        let output = run_to_completion(command.wrapped_in(&self.program, &["stat"]), timeout)?;
        let reading = parse_perf_stat(&output.stderr)?;
        Ok(Telemetry {
            reading,
            exit_code: output.exit_code,
        })
    }
}

/// Parse the elapsed, user and sys lines of `perf stat` output
///
/// Each value is the first `<digits>.<digits>` immediately followed by its
/// unit phrase; everything else in the text is ignored.
///
/// # Errors
///
/// Returns [`Error::TelemetryParse`] naming the first value that is missing
pub fn parse_perf_stat(text: &str) -> Result<TimingReading> {
    Ok(TimingReading {
        real_seconds: labelled_seconds(text, ELAPSED_PHRASE, "elapsed time")?,
        user_seconds: labelled_seconds(text, USER_PHRASE, "user time")?,
        sys_seconds: labelled_seconds(text, SYS_PHRASE, "sys time")?,
    })
}

fn labelled_seconds(text: &str, phrase: &str, what: &str) -> Result<f64> {
    text.match_indices(phrase)
        .find_map(|(idx, _)| decimal_ending_at(text, idx))
        .ok_or_else(|| Error::TelemetryParse {
            source_name: SOURCE_NAME.to_string(),
            message: format!("no {what} record ('<seconds>{phrase}') in output"),
        })
}

//! Single-run process sampling
//!
//! A [`ProcessSampler`] runs the target command once under each of two
//! independent telemetry sources and combines their readings into one
//! [`ExecutionSample`]:
//!
//! 1. **Timing** ([`TimingSource`], default [`PerfStatSource`]): real, user and
//!    system time
//! 2. **Memory** ([`MemorySource`], default [`GnuTimeSource`]): peak resident set
//!    size in KB
//!
//! Neither source alone reports both reliably on every platform, so each
//! contributes the values it is best at. A source whose output contains no
//! well-formed record fails the sample with [`Error::TelemetryParse`]; nothing
//! is ever defaulted to zero.
//!
//! # Example
//!
//! ```rust,no_run
//! use medidor::sampler::{ProcessSampler, Sampler, TargetCommand};
//!
//! let sampler = ProcessSampler::new();
//! let outcome = sampler.sample(&TargetCommand::new("gen/erl/run"), None)?;
//! println!("user time: {:.3}s", outcome.sample.user_time_seconds());
//! # Ok::<(), medidor::Error>(())
//! ```

mod executor;
mod perf;
mod time;

pub use executor::{is_available, run_to_completion, PlainCapture};
pub use perf::{parse_perf_stat, PerfStatSource};
pub use time::{parse_time_stats, GnuTimeSource, TimeStats};

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Executable plus fixed arguments to be measured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl TargetCommand {
    /// Create a command for the given executable
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command from the given directory
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Executable path
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Fixed arguments
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if one was set
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Build a [`Command`] running the target directly
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Build a [`Command`] running the target under a wrapping tool
    ///
    /// The wrapper receives `wrapper_args` first, then the target program and
    /// its arguments.
    #[must_use]
    pub fn wrapped_in(&self, wrapper: &str, wrapper_args: &[&str]) -> Command {
        let mut cmd = Command::new(wrapper);
        cmd.args(wrapper_args).arg(&self.program).args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl fmt::Display for TargetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of one child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code (`None` when terminated by a signal)
    pub exit_code: Option<i32>,
    /// Wall-clock time observed by the caller, in milliseconds
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// Whether the process exited with status zero
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Elapsed, user and system time of one run, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingReading {
    /// Wall-clock time
    pub real_seconds: f64,
    /// User-mode CPU time
    pub user_seconds: f64,
    /// Kernel-mode CPU time
    pub sys_seconds: f64,
}

/// Peak memory of one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryReading {
    /// Maximum resident set size in KB
    pub peak_resident_kb: f64,
}

/// A telemetry reading together with the exit status of the wrapped run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry<T> {
    /// Parsed reading
    pub reading: T,
    /// Exit code reported by the wrapper (it propagates the target's status)
    pub exit_code: Option<i32>,
}

/// Source of timing telemetry
pub trait TimingSource: Send + Sync {
    /// Human-readable source name used in error messages
    fn name(&self) -> &str;

    /// Run the target once and read its timing
    ///
    /// # Errors
    ///
    /// Returns [`Error::TelemetryParse`] if the source output holds no timing
    /// record, [`Error::Timeout`] if the run exceeded `timeout`, or a spawn error.
    fn measure_timing(
        &self,
        command: &TargetCommand,
        timeout: Option<Duration>,
    ) -> Result<Telemetry<TimingReading>>;
}

/// Source of peak-memory telemetry
pub trait MemorySource: Send + Sync {
    /// Human-readable source name used in error messages
    fn name(&self) -> &str;

    /// Run the target once and read its peak memory
    ///
    /// # Errors
    ///
    /// Returns [`Error::TelemetryParse`] if the source output holds no memory
    /// record, [`Error::Timeout`] if the run exceeded `timeout`, or a spawn error.
    fn measure_memory(
        &self,
        command: &TargetCommand,
        timeout: Option<Duration>,
    ) -> Result<Telemetry<MemoryReading>>;
}

/// Runs the target without instrumentation to capture its output
pub trait OutputCapture: Send + Sync {
    /// Run the target once and return everything it printed
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or times out
    fn capture(&self, command: &TargetCommand, timeout: Option<Duration>)
        -> Result<ProcessOutput>;
}

/// Timing and memory of one target run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSample {
    real_time_seconds: f64,
    user_time_seconds: f64,
    sys_time_seconds: f64,
    peak_resident_kb: f64,
}

impl ExecutionSample {
    /// Create a sample, rejecting negative or non-finite values
    ///
    /// # Errors
    ///
    /// Returns [`Error::TelemetryParse`] naming the offending field
    pub fn new(
        real_time_seconds: f64,
        user_time_seconds: f64,
        sys_time_seconds: f64,
        peak_resident_kb: f64,
    ) -> Result<Self> {
        for (field, value) in [
            ("real time", real_time_seconds),
            ("user time", user_time_seconds),
            ("sys time", sys_time_seconds),
            ("peak resident memory", peak_resident_kb),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::TelemetryParse {
                    source_name: "sample".to_string(),
                    message: format!("{field} must be a finite non-negative number, got {value}"),
                });
            }
        }
        Ok(Self {
            real_time_seconds,
            user_time_seconds,
            sys_time_seconds,
            peak_resident_kb,
        })
    }

    /// Combine a timing reading with a memory reading
    ///
    /// # Errors
    ///
    /// Returns [`Error::TelemetryParse`] if any value is negative or non-finite
    pub fn from_readings(timing: TimingReading, memory: MemoryReading) -> Result<Self> {
        Self::new(
            timing.real_seconds,
            timing.user_seconds,
            timing.sys_seconds,
            memory.peak_resident_kb,
        )
    }

    /// Wall-clock time in seconds
    #[must_use]
    pub fn real_time_seconds(&self) -> f64 {
        self.real_time_seconds
    }

    /// User-mode CPU time in seconds
    #[must_use]
    pub fn user_time_seconds(&self) -> f64 {
        self.user_time_seconds
    }

    /// Kernel-mode CPU time in seconds
    #[must_use]
    pub fn sys_time_seconds(&self) -> f64 {
        self.sys_time_seconds
    }

    /// Maximum resident set size in KB
    #[must_use]
    pub fn peak_resident_kb(&self) -> f64 {
        self.peak_resident_kb
    }
}

/// One sample plus the exit status observed while taking it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOutcome {
    /// Combined telemetry
    pub sample: ExecutionSample,
    /// Failing status if either wrapper saw one (`None` for a signal), else `Some(0)`
    pub exit_code: Option<i32>,
}

impl SampleOutcome {
    /// Whether the target exited with status zero under both wrappers
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Produces one [`ExecutionSample`] per call
pub trait Sampler: Send + Sync {
    /// Run the target to completion exactly once per telemetry source
    ///
    /// # Errors
    ///
    /// Returns an error if either source fails or produces no readable record
    fn sample(&self, command: &TargetCommand, timeout: Option<Duration>) -> Result<SampleOutcome>;
}

/// Default sampler combining a timing source with a memory source
pub struct ProcessSampler {
    timing: Box<dyn TimingSource>,
    memory: Box<dyn MemorySource>,
}

impl fmt::Debug for ProcessSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSampler")
            .field("timing", &format!("<{}>", self.timing.name()))
            .field("memory", &format!("<{}>", self.memory.name()))
            .finish()
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler {
    /// Sampler using `perf stat` for timing and `/usr/bin/time` for memory
    #[must_use]
    pub fn new() -> Self {
        Self {
            timing: Box::new(PerfStatSource::new()),
            memory: Box::new(GnuTimeSource::new()),
        }
    }

    /// Replace the timing source
    #[must_use]
    pub fn with_timing_source(mut self, source: Box<dyn TimingSource>) -> Self {
        self.timing = source;
        self
    }

    /// Replace the memory source
    #[must_use]
    pub fn with_memory_source(mut self, source: Box<dyn MemorySource>) -> Self {
        self.memory = source;
        self
    }
}

impl Sampler for ProcessSampler {
    fn sample(&self, command: &TargetCommand, timeout: Option<Duration>) -> Result<SampleOutcome> {
        let timing = self.timing.measure_timing(command, timeout)?;
        let memory = self.memory.measure_memory(command, timeout)?;

        if timing.exit_code != memory.exit_code {
            tracing::debug!(
                timing_exit = ?timing.exit_code,
                memory_exit = ?memory.exit_code,
                "telemetry wrappers observed different exit codes"
            );
        }

        let sample = ExecutionSample::from_readings(timing.reading, memory.reading)?;
        Ok(SampleOutcome {
            sample,
            exit_code: worst_exit_code(timing.exit_code, memory.exit_code),
        })
    }
}

/// Prefer a failing status over a successful one
fn worst_exit_code(first: Option<i32>, second: Option<i32>) -> Option<i32> {
    match (first, second) {
        (Some(0), other) | (other, Some(0)) => other,
        (None, _) | (_, None) => None,
        (Some(code), Some(_)) => Some(code),
    }
}

/// Parse a decimal `<digits>.<digits>` that ends right before byte `end`
pub(crate) fn decimal_ending_at(text: &str, end: usize) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut start = end;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end || start == 0 || bytes[start - 1] != b'.' {
        return None;
    }
    let dot = start - 1;
    start = dot;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == dot {
        return None;
    }
    text[start..end].parse().ok()
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

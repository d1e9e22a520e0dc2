//! Repeated measurement of one configuration
//!
//! [`RepeatedMeasurement`] samples the target `R` times, strictly one process
//! at a time, and reduces the samples to per-metric arithmetic means. When
//! traces are requested each repetition also runs the target a third time,
//! without instrumentation, and keeps its standard output.
//!
//! A failing repetition discards the whole configuration: the caller receives
//! [`Error::Measurement`] naming the configuration and the repetition, and no
//! partial average is ever returned.
//!
//! # Example
//!
//! ```rust,no_run
//! use medidor::measurement::{MeasurementConfig, RepeatedMeasurement};
//! use medidor::sampler::TargetCommand;
//!
//! let config = MeasurementConfig::new("consecutive_calls/plain")
//!     .repetitions(20)
//!     .with_traces(true);
//! let summary = RepeatedMeasurement::new().run(&config, &TargetCommand::new("gen/erl/run"))?;
//! println!("mean user time: {:.3}s", summary.mean_user_time_seconds);
//! # Ok::<(), medidor::Error>(())
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::sampler::{
    ExecutionSample, OutputCapture, PlainCapture, ProcessSampler, Sampler, TargetCommand,
};
use crate::{Error, Result};

/// Configuration for measuring one program variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Label identifying the configuration in logs and errors
    pub label: String,
    /// Number of repetitions (must be at least 1)
    pub repetition_count: usize,
    /// Keep the standard output of every repetition for trace analysis
    pub captures_traces: bool,
    /// Classes whose scheduler decisions the instrumented build logs
    pub logged_subjects: BTreeSet<String>,
    /// Per-run timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Treat a non-zero target exit status as a failed repetition
    pub fail_on_nonzero_exit: bool,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            label: "measurement".to_string(),
            repetition_count: 20,
            captures_traces: false,
            logged_subjects: BTreeSet::new(),
            timeout: None,
            fail_on_nonzero_exit: false,
        }
    }
}

impl MeasurementConfig {
    /// Create a configuration with default settings and the given label
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Set the label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the number of repetitions
    #[must_use]
    pub fn repetitions(mut self, count: usize) -> Self {
        self.repetition_count = count;
        self
    }

    /// Enable or disable output capture
    #[must_use]
    pub fn with_traces(mut self, capture: bool) -> Self {
        self.captures_traces = capture;
        self
    }

    /// Add a logged subject
    #[must_use]
    pub fn log_subject(mut self, subject: impl Into<String>) -> Self {
        self.logged_subjects.insert(subject.into());
        self
    }

    /// Set a per-run timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fail the measurement when the target exits unsuccessfully
    #[must_use]
    pub fn fail_on_nonzero_exit(mut self, fail: bool) -> Self {
        self.fail_on_nonzero_exit = fail;
        self
    }

    /// Check the configuration before running it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for zero repetitions or a zero timeout
    pub fn validate(&self) -> Result<()> {
        if self.repetition_count == 0 {
            return Err(Error::Configuration(format!(
                "'{}': repetition count must be at least 1",
                self.label
            )));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Configuration(format!(
                "'{}': timeout must be greater than zero",
                self.label
            )));
        }
        Ok(())
    }
}

/// Mean timing and memory of one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSummary {
    /// Configuration label
    pub label: String,
    /// Number of samples folded into the means
    pub sample_count: usize,
    /// Mean wall-clock time in seconds
    pub mean_real_time_seconds: f64,
    /// Mean user-mode time in seconds
    pub mean_user_time_seconds: f64,
    /// Mean kernel-mode time in seconds
    pub mean_sys_time_seconds: f64,
    /// Mean peak resident set size in KB
    pub mean_peak_resident_kb: f64,
    /// Standard output of each repetition, in run order (only when requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_outputs: Option<Vec<String>>,
    /// Repetitions whose target exited unsuccessfully
    #[serde(default)]
    pub nonzero_exit_count: usize,
}

impl MeasurementSummary {
    /// Reduce already collected samples to their means
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `samples` is empty
    pub fn from_samples(label: impl Into<String>, samples: &[ExecutionSample]) -> Result<Self> {
        let label = label.into();
        if samples.is_empty() {
            return Err(Error::Configuration(format!(
                "'{label}': cannot summarize zero samples"
            )));
        }

        let mut acc = Accumulator::default();
        for sample in samples {
            acc.add(sample, true);
        }
        Ok(acc.finish(label, None))
    }

    /// Captured outputs, or an empty slice when none were captured
    #[must_use]
    pub fn traces(&self) -> &[String] {
        self.captured_outputs.as_deref().unwrap_or_default()
    }
}

/// Running means over the samples of one configuration
///
/// Each mean is updated as `m += (x - m) / k`, so R identical samples
/// reduce to exactly that sample.
#[derive(Debug, Default)]
struct Accumulator {
    real: f64,
    user: f64,
    sys: f64,
    peak_resident_kb: f64,
    count: usize,
    nonzero_exits: usize,
}

impl Accumulator {
    fn add(&mut self, sample: &ExecutionSample, success: bool) {
        self.count += 1;
        let k = self.count as f64;
        let update = |mean: &mut f64, x: f64| *mean += (x - *mean) / k;
        update(&mut self.real, sample.real_time_seconds());
        update(&mut self.user, sample.user_time_seconds());
        update(&mut self.sys, sample.sys_time_seconds());
        update(&mut self.peak_resident_kb, sample.peak_resident_kb());
        if !success {
            self.nonzero_exits += 1;
        }
    }

    fn finish(self, label: String, captured_outputs: Option<Vec<String>>) -> MeasurementSummary {
        MeasurementSummary {
            label,
            sample_count: self.count,
            mean_real_time_seconds: self.real,
            mean_user_time_seconds: self.user,
            mean_sys_time_seconds: self.sys,
            mean_peak_resident_kb: self.peak_resident_kb,
            captured_outputs,
            nonzero_exit_count: self.nonzero_exits,
        }
    }
}

/// Shared flag for cooperative cancellation between repetitions
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the running repetition still completes
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a [`Sampler`] repeatedly for one configuration
pub struct RepeatedMeasurement {
    sampler: Box<dyn Sampler>,
    capture: Box<dyn OutputCapture>,
    cancel: Option<CancelToken>,
}

impl fmt::Debug for RepeatedMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatedMeasurement")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Default for RepeatedMeasurement {
    fn default() -> Self {
        Self::new()
    }
}

impl RepeatedMeasurement {
    /// Measurement with the default [`ProcessSampler`] and [`PlainCapture`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            sampler: Box::new(ProcessSampler::new()),
            capture: Box::new(PlainCapture),
            cancel: None,
        }
    }

    /// Replace the sampler
    #[must_use]
    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Replace the output capture used for traces
    #[must_use]
    pub fn with_capture(mut self, capture: Box<dyn OutputCapture>) -> Self {
        self.capture = capture;
        self
    }

    /// Check this token before every repetition
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Measure one configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an invalid configuration,
    /// [`Error::Cancelled`] if cancelled between repetitions, or
    /// [`Error::Measurement`] wrapping the first failing repetition.
    pub fn run(
        &self,
        config: &MeasurementConfig,
        command: &TargetCommand,
    ) -> Result<MeasurementSummary> {
        config.validate()?;

        let total = config.repetition_count;
        let mut acc = Accumulator::default();
        let mut outputs = config.captures_traces.then(|| Vec::with_capacity(total));

        tracing::info!(
            configuration = %config.label,
            repetitions = total,
            command = %command,
            traces = config.captures_traces,
            "starting measurement"
        );

        for repetition in 1..=total {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                tracing::info!(configuration = %config.label, repetition, "measurement cancelled");
                return Err(Error::Cancelled {
                    configuration: config.label.clone(),
                    repetition,
                });
            }

            let outcome = self
                .sampler
                .sample(command, config.timeout)
                .map_err(|cause| failure(config, repetition, cause))?;

            if !outcome.success() {
                tracing::warn!(
                    configuration = %config.label,
                    repetition,
                    exit_code = ?outcome.exit_code,
                    "target exited unsuccessfully"
                );
                if config.fail_on_nonzero_exit {
                    return Err(failure(
                        config,
                        repetition,
                        Error::UnsuccessfulExit(outcome.exit_code),
                    ));
                }
            }

            if let Some(outputs) = outputs.as_mut() {
                let captured = self
                    .capture
                    .capture(command, config.timeout)
                    .map_err(|cause| failure(config, repetition, cause))?;
                outputs.push(captured.stdout);
            }

            tracing::debug!(
                configuration = %config.label,
                repetition,
                real = outcome.sample.real_time_seconds(),
                user = outcome.sample.user_time_seconds(),
                sys = outcome.sample.sys_time_seconds(),
                peak_kb = outcome.sample.peak_resident_kb(),
                "repetition complete"
            );

            acc.add(&outcome.sample, outcome.success());
        }

        let summary = acc.finish(config.label.clone(), outputs);
        tracing::info!(
            configuration = %summary.label,
            mean_user = summary.mean_user_time_seconds,
            mean_peak_kb = summary.mean_peak_resident_kb,
            "measurement complete"
        );
        Ok(summary)
    }
}

fn failure(config: &MeasurementConfig, repetition: usize, cause: Error) -> Error {
    Error::Measurement {
        configuration: config.label.clone(),
        repetition,
        total: config.repetition_count,
        cause: Box::new(cause),
    }
}

//! Parameter sweeps over both program variants
//!
//! For every parameter the sweep asks a [`VariantBuilder`] to prepare the
//! plain variant, measures it, then prepares and measures the enforced
//! variant. Preparing a variant rewrites the target on disk, so nothing here
//! runs concurrently.
//!
//! ```text
//! parameter ──► prepare(plain) ──► RepeatedMeasurement ──┐
//!          └──► prepare(enforced) ► RepeatedMeasurement ──┴──► SweepRow
//!                                        │
//!                                        └─► fidelity / scheduler summaries
//! ```

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compare::VariantComparison;
use crate::fidelity::{FidelityAnalyzer, FidelityReport};
use crate::measurement::{MeasurementConfig, MeasurementSummary, RepeatedMeasurement};
use crate::sampler::{run_to_completion, TargetCommand};
use crate::trace::{SchedulerLogSummary, SequenceShape};
use crate::{Error, Result, Variant};

/// Prepares the target for one parameter and variant
///
/// Implementations render model templates and invoke the compiler; the sweep
/// only needs to know whether that succeeded.
pub trait VariantBuilder: Send + Sync {
    /// Name for logs
    fn name(&self) -> &str;

    /// Build the target for `parameter` as `variant`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] if the target could not be prepared
    fn prepare(&self, parameter: u64, variant: Variant) -> Result<()>;
}

/// Runs a shell command to prepare each variant
///
/// The command sees `MEDIDOR_PARAMETER` and `MEDIDOR_VARIANT` (`plain` or
/// `enforced`) in its environment.
#[derive(Debug, Clone)]
pub struct ShellBuilder {
    script: String,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ShellBuilder {
    /// Builder running `script` with `sh -c`
    #[must_use]
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Run the script in this directory
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill the script if it runs longer than this
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl VariantBuilder for ShellBuilder {
    fn name(&self) -> &str {
        &self.script
    }

    fn prepare(&self, parameter: u64, variant: Variant) -> Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.script)
            .env("MEDIDOR_PARAMETER", parameter.to_string())
            .env("MEDIDOR_VARIANT", variant.to_string());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let build_error = |message: String| Error::Build {
            parameter,
            variant: variant.to_string(),
            message,
        };

        let output = run_to_completion(cmd, self.timeout).map_err(|e| build_error(e.to_string()))?;
        if !output.success() {
            let stderr = output.stderr.trim();
            return Err(build_error(format!(
                "build command exited with {:?}: {stderr}",
                output.exit_code
            )));
        }

        tracing::debug!(parameter, %variant, duration_ms = output.duration_ms, "variant prepared");
        Ok(())
    }
}

/// What to do when one configuration fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the sweep and return the error
    #[default]
    Abort,
    /// Record the failure and continue with the next parameter
    Skip,
}

/// Configuration of a parameter sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Parameters to sweep, in order
    pub parameters: Vec<u64>,
    /// Measurement settings shared by every configuration
    pub measurement: MeasurementConfig,
    /// Methods per iteration; when set, the parameter is the iteration count
    /// of the expected invocation sequence and traces are scored
    pub methods: Option<usize>,
    /// Behavior when a configuration fails
    pub failure_policy: FailurePolicy,
    /// Show a progress bar
    pub show_progress: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            parameters: vec![1, 5, 10, 50, 100, 300, 500],
            measurement: MeasurementConfig::new("sweep"),
            methods: None,
            failure_policy: FailurePolicy::Abort,
            show_progress: false,
        }
    }
}

impl SweepConfig {
    /// Create a sweep configuration with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parameters to sweep
    #[must_use]
    pub fn with_parameters(mut self, parameters: impl Into<Vec<u64>>) -> Self {
        self.parameters = parameters.into();
        self
    }

    /// Set the shared measurement settings
    #[must_use]
    pub fn with_measurement(mut self, measurement: MeasurementConfig) -> Self {
        self.measurement = measurement;
        self
    }

    /// Score traces against a sequence with this many methods per iteration
    #[must_use]
    pub fn with_methods(mut self, methods: usize) -> Self {
        self.methods = Some(methods);
        self
    }

    /// Set the failure policy
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Enable or disable the progress bar
    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Check the configuration before running it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an empty parameter list, zero
    /// methods, or invalid measurement settings
    pub fn validate(&self) -> Result<()> {
        if self.parameters.is_empty() {
            return Err(Error::Configuration(
                "sweep needs at least one parameter".to_string(),
            ));
        }
        if self.methods == Some(0) {
            return Err(Error::Configuration(
                "method count must be at least 1".to_string(),
            ));
        }
        self.measurement.validate()
    }

    /// Measurement settings for one parameter and variant
    fn configuration_for(&self, parameter: u64, variant: Variant) -> MeasurementConfig {
        let traces = self.measurement.captures_traces || self.methods.is_some();
        self.measurement
            .clone()
            .with_label(format!("{}/{parameter}/{variant}", self.measurement.label))
            .with_traces(traces)
    }
}

/// Measurement and analysis of one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantResult {
    /// Timing and memory means
    pub summary: MeasurementSummary,
    /// Trace fidelity, when a method count was configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fidelity: Option<FidelityReport>,
    /// Scheduler activity, when traces were captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerLogSummary>,
}

/// Both variants measured for one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    /// Sweep parameter
    pub parameter: u64,
    /// Result without enforcement
    pub plain: VariantResult,
    /// Result with enforcement
    pub enforced: VariantResult,
}

impl SweepRow {
    /// Side-by-side comparison of the two variants
    #[must_use]
    pub fn comparison(&self) -> VariantComparison {
        let comparison =
            VariantComparison::new(self.plain.summary.clone(), self.enforced.summary.clone());
        match (&self.plain.fidelity, &self.enforced.fidelity) {
            (Some(plain), Some(enforced)) => {
                comparison.with_fidelity(plain.clone(), enforced.clone())
            }
            _ => comparison,
        }
    }
}

/// A configuration skipped under [`FailurePolicy::Skip`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    /// Parameter that failed
    pub parameter: u64,
    /// Variant that failed
    pub variant: Variant,
    /// Error message
    pub message: String,
}

/// Everything a sweep produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepOutcome {
    /// Identifier shared by all records of this sweep
    pub run_id: Uuid,
    /// Completed rows, in parameter order
    pub rows: Vec<SweepRow>,
    /// Skipped configurations
    pub failures: Vec<SweepFailure>,
}

/// Runs a sweep with one measurement driver and one builder
pub struct Sweep {
    measurement: RepeatedMeasurement,
    builder: Box<dyn VariantBuilder>,
}

impl fmt::Debug for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sweep")
            .field("measurement", &self.measurement)
            .field("builder", &format!("<{}>", self.builder.name()))
            .finish()
    }
}

impl Sweep {
    /// Sweep with the default measurement driver
    #[must_use]
    pub fn new(builder: Box<dyn VariantBuilder>) -> Self {
        Self {
            measurement: RepeatedMeasurement::new(),
            builder,
        }
    }

    /// Replace the measurement driver
    #[must_use]
    pub fn with_measurement(mut self, measurement: RepeatedMeasurement) -> Self {
        self.measurement = measurement;
        self
    }

    /// Run the sweep against the built target
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an invalid configuration, or under
    /// [`FailurePolicy::Abort`] the first build or measurement error
    pub fn run(&self, config: &SweepConfig, command: &TargetCommand) -> Result<SweepOutcome> {
        config.validate()?;

        let run_id = Uuid::new_v4();
        let mut rows = Vec::with_capacity(config.parameters.len());
        let mut failures = Vec::new();

        tracing::info!(
            %run_id,
            parameters = ?config.parameters,
            builder = self.builder.name(),
            "starting sweep"
        );

        let progress = if config.show_progress {
            let pb = ProgressBar::new((config.parameters.len() * Variant::ALL.len()) as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            Some(pb)
        } else {
            None
        };

        'parameters: for &parameter in &config.parameters {
            let mut results = Vec::with_capacity(Variant::ALL.len());

            for variant in Variant::ALL {
                if let Some(pb) = &progress {
                    pb.set_message(format!("{parameter} {variant}"));
                }

                let result = self.run_variant(config, command, parameter, variant);

                if let Some(pb) = &progress {
                    pb.inc(1);
                }

                match result {
                    Ok(result) => results.push(result),
                    Err(e) if config.failure_policy == FailurePolicy::Skip => {
                        tracing::warn!(parameter, %variant, error = %e, "skipping failed configuration");
                        failures.push(SweepFailure {
                            parameter,
                            variant,
                            message: e.to_string(),
                        });
                        if let (Some(pb), Variant::Plain) = (&progress, variant) {
                            pb.inc(1);
                        }
                        continue 'parameters;
                    }
                    Err(e) => {
                        if let Some(pb) = &progress {
                            pb.abandon();
                        }
                        return Err(e);
                    }
                }
            }

            let mut results = results.into_iter();
            if let (Some(plain), Some(enforced)) = (results.next(), results.next()) {
                rows.push(SweepRow {
                    parameter,
                    plain,
                    enforced,
                });
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("done");
        }

        tracing::info!(
            %run_id,
            completed = rows.len(),
            skipped = failures.len(),
            "sweep complete"
        );

        Ok(SweepOutcome {
            run_id,
            rows,
            failures,
        })
    }

    fn run_variant(
        &self,
        config: &SweepConfig,
        command: &TargetCommand,
        parameter: u64,
        variant: Variant,
    ) -> Result<VariantResult> {
        self.builder.prepare(parameter, variant)?;

        let measurement = config.configuration_for(parameter, variant);
        let summary = self.measurement.run(&measurement, command)?;

        let fidelity = match config.methods {
            Some(methods) => {
                let iterations = usize::try_from(parameter).map_err(|_| {
                    Error::Configuration(format!(
                        "parameter {parameter} is too large for an iteration count"
                    ))
                })?;
                let analyzer = FidelityAnalyzer::new(SequenceShape::new(iterations, methods))?;
                Some(analyzer.report(summary.traces())?)
            }
            None => None,
        };

        let scheduler = summary.captured_outputs.as_ref().map(|outputs| {
            SchedulerLogSummary::from_outputs(outputs, &measurement.logged_subjects)
        });

        Ok(VariantResult {
            summary,
            fidelity,
            scheduler,
        })
    }
}

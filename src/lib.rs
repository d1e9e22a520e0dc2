//! Medidor - Overhead and Fidelity Measurement for Protocol Enforcement
//!
//! Medidor compares a *plain* build of a program with an *enforced* build, in
//! which a runtime scheduler only activates methods in an order allowed by a
//! protocol. It answers two questions: how much does enforcement cost in
//! time and memory, and does it actually preserve the intended invocation
//! order under concurrent scheduling?
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           MEDIDOR CORE                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Sampler   →   Measurement   →   Trace        →   Fidelity       │
//! │  perf/time     R repetitions     extraction       edit distance  │
//! │                                  scheduler log    order check    │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Sweep (parameters × variants)   →   Compare   →   Report        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use medidor::fidelity::FidelityAnalyzer;
//! use medidor::measurement::{MeasurementConfig, RepeatedMeasurement};
//! use medidor::sampler::TargetCommand;
//! use medidor::trace::SequenceShape;
//!
//! let config = MeasurementConfig::new("consecutive_calls/enforced")
//!     .repetitions(20)
//!     .with_traces(true);
//! let summary = RepeatedMeasurement::new().run(&config, &TargetCommand::new("gen/erl/run"))?;
//!
//! let analyzer = FidelityAnalyzer::new(SequenceShape::new(100, 3))?;
//! let report = analyzer.report(summary.traces())?;
//! println!("mean edits: {:.2}", report.mean_edit_distance);
//! # Ok::<(), medidor::Error>(())
//! ```
//!
//! # Modules
//!
//! - [`sampler`] - Telemetry sources (`perf stat`, GNU `time`) and process execution
//! - [`measurement`] - Repeated measurement reduced to per-configuration means
//! - [`trace`] - Invocation marker extraction and scheduler log parsing
//! - [`fidelity`] - Levenshtein fidelity scores and pairwise order checks
//! - [`compare`] - Relative cost of enforcement
//! - [`sweep`] - Sequential parameter sweeps over both variants
//! - [`report`] - JSON, JSON Lines and table output

// Note: Lint configuration is in Cargo.toml [lints]
#![forbid(unsafe_code)]

pub mod compare;
pub mod error;
pub mod fidelity;
pub mod measurement;
pub mod report;
pub mod sampler;
pub mod sweep;
pub mod trace;

use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

/// Build of the program under measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Compiled without protocol enforcement
    Plain,
    /// Compiled with protocol enforcement
    Enforced,
}

impl Variant {
    /// Both variants, in measurement order
    pub const ALL: [Variant; 2] = [Variant::Plain, Variant::Enforced];
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Enforced => write!(f, "enforced"),
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "enforced" => Ok(Self::Enforced),
            other => Err(Error::Configuration(format!("unknown variant '{other}'"))),
        }
    }
}

/// Commonly used types
pub mod prelude {
    pub use crate::compare::VariantComparison;
    pub use crate::fidelity::{FidelityAnalyzer, FidelityReport, FidelityScore, OrderCheck};
    pub use crate::measurement::{MeasurementConfig, MeasurementSummary, RepeatedMeasurement};
    pub use crate::sampler::{ExecutionSample, ProcessSampler, TargetCommand};
    pub use crate::sweep::{FailurePolicy, Sweep, SweepConfig, VariantBuilder};
    pub use crate::trace::{extract_invocations, parse_scheduler_log, SequenceShape};
    pub use crate::{Error, Result, Variant};
}

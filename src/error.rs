//! Error types for Medidor
//!
//! This module defines the error types used throughout the library.
//! Skipped log or trace lines are not errors: they are reported through
//! `tracing` and counted where the caller can observe them.

use thiserror::Error;

/// Result type alias for Medidor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during Medidor operations
#[derive(Error, Debug)]
pub enum Error {
    /// A telemetry source produced no well-formed numeric record
    #[error("telemetry parse error from {source_name}: {message}")]
    TelemetryParse {
        /// Name of the telemetry source (e.g. `perf stat`)
        source_name: String,
        /// What was missing or malformed
        message: String,
    },

    /// A repetition failed, so the whole configuration was discarded
    #[error("measurement of '{configuration}' failed at repetition {repetition} of {total}: {cause}")]
    Measurement {
        /// Label of the configuration being measured
        configuration: String,
        /// 1-based index of the failing repetition
        repetition: usize,
        /// Number of repetitions requested
        total: usize,
        /// Underlying failure
        #[source]
        cause: Box<Error>,
    },

    /// Execution timeout
    #[error("execution timeout after {0}ms")]
    Timeout(u64),

    /// The target exited unsuccessfully and the configuration treats that as fatal
    #[error("target exited unsuccessfully (exit code {0:?})")]
    UnsuccessfulExit(Option<i32>),

    /// A child process could not be started
    #[error("failed to spawn '{program}': {message}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Error message
        message: String,
    },

    /// Measurement was cancelled between repetitions
    #[error("measurement of '{configuration}' cancelled before repetition {repetition}")]
    Cancelled {
        /// Label of the configuration being measured
        configuration: String,
        /// 1-based index of the repetition that did not start
        repetition: usize,
    },

    /// The external model builder failed to prepare a variant
    #[error("build error for parameter {parameter} ({variant}): {message}")]
    Build {
        /// Sweep parameter being prepared
        parameter: u64,
        /// Variant being prepared
        variant: String,
        /// Error message
        message: String,
    },

    /// Trace analysis could not be performed
    #[error("analysis error: {0}")]
    Analysis(String),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether this error, or the failure it wraps, is a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Measurement { cause, .. } => cause.is_timeout(),
            _ => false,
        }
    }

    /// Whether this error, or the failure it wraps, is a telemetry parse failure
    #[must_use]
    pub fn is_telemetry_parse(&self) -> bool {
        match self {
            Self::TelemetryParse { .. } => true,
            Self::Measurement { cause, .. } => cause.is_telemetry_parse(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

//! Book example validation tests
//!
//! This module contains all tests that validate code examples in documentation.
//! Every example in the book MUST have a corresponding test here.
//!
//! ## Structure
//!
//! - `measurement/` - Tests for the repeated measurement chapters
//! - `analysis/` - Tests for trace fidelity and scheduler log chapters
//! - `pipeline/` - Tests for parameter sweeps and reports
//!
//! ## CI Enforcement
//!
//! The book build will FAIL if any test in this module fails.
//! Examples that spawn processes skip themselves when `sh` or GNU `time` is missing.

mod analysis;
mod measurement;
mod pipeline;

/// Route library logs through the test harness
pub(crate) fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Whether a POSIX shell can be spawned
pub(crate) fn has_shell() -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg("true")
        .output()
        .is_ok()
}

//! Invocation traces and expected sequences
//!
//! The instrumented target prints a marker `m<method>(<iteration>)` every time
//! one of its methods runs. [`extract_invocations`] turns captured output into
//! the ordered list of those markers, and [`SequenceShape`] builds the order a
//! correct schedule would produce.
//!
//! The [`scheduler`] submodule parses the scheduler decisions logged by the
//! enforcement layer.

pub mod scheduler;

pub use scheduler::{parse_scheduler_log, SchedulerEvent, SchedulerLog, SchedulerLogSummary};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One observed or expected method invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationToken {
    /// Method identifier, `m` followed by digits
    pub method_id: String,
    /// Loop iteration in which the method ran
    pub iteration: usize,
}

impl InvocationToken {
    /// Token for the method with the given index
    #[must_use]
    pub fn new(method_index: usize, iteration: usize) -> Self {
        Self {
            method_id: method_name(method_index),
            iteration,
        }
    }
}

impl fmt::Display for InvocationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.method_id, self.iteration)
    }
}

impl FromStr for InvocationToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match match_token_at(s.trim().as_bytes(), 0) {
            Some((token, end)) if end == s.trim().len() => Ok(token),
            _ => Err(Error::Analysis(format!(
                "'{s}' is not an invocation marker of the form m<digits>(<digits>)"
            ))),
        }
    }
}

/// Method identifier for a method index (`0` → `m0`)
#[must_use]
pub fn method_name(index: usize) -> String {
    format!("m{index}")
}

/// Extract invocation markers in order of appearance
///
/// Scans left to right for `m<digits>(<digits>)`, taking the leftmost match
/// and continuing after it. Anything else, including incomplete markers such
/// as `m3(` or `m(1)`, is skipped.
#[must_use]
pub fn extract_invocations(text: &str) -> Vec<InvocationToken> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(offset) = bytes[pos..].iter().position(|&b| b == b'm') {
        let start = pos + offset;
        match match_token_at(bytes, start) {
            Some((token, end)) => {
                tokens.push(token);
                pos = end;
            }
            None => pos = start + 1,
        }
    }

    tokens
}

/// Try to match one marker starting exactly at `start`
fn match_token_at(bytes: &[u8], start: usize) -> Option<(InvocationToken, usize)> {
    if bytes.get(start) != Some(&b'm') {
        return None;
    }
    let method_end = digits_end(bytes, start + 1)?;
    if bytes.get(method_end) != Some(&b'(') {
        return None;
    }
    let iteration_start = method_end + 1;
    let iteration_end = digits_end(bytes, iteration_start)?;
    if bytes.get(iteration_end) != Some(&b')') {
        return None;
    }

    // Only ASCII digits were consumed, so these slices are valid UTF-8
    let method_id = std::str::from_utf8(&bytes[start..method_end]).ok()?;
    let iteration_text = std::str::from_utf8(&bytes[iteration_start..iteration_end]).ok()?;
    let Ok(iteration) = iteration_text.parse::<usize>() else {
        tracing::debug!(marker = %iteration_text, "skipping invocation marker with oversized iteration");
        return None;
    };

    Some((
        InvocationToken {
            method_id: method_id.to_string(),
            iteration,
        },
        iteration_end + 1,
    ))
}

/// End of a non-empty run of ASCII digits starting at `start`
fn digits_end(bytes: &[u8], start: usize) -> Option<usize> {
    let len = bytes
        .get(start..)?
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    (len > 0).then_some(start + len)
}

/// Dimensions of the expected invocation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceShape {
    /// Number of loop iterations
    pub iterations: usize,
    /// Number of methods called per iteration
    pub methods: usize,
}

impl SequenceShape {
    /// Create a shape
    #[must_use]
    pub fn new(iterations: usize, methods: usize) -> Self {
        Self {
            iterations,
            methods,
        }
    }

    /// Number of tokens in the expected sequence, or `None` if it overflows
    #[must_use]
    pub fn checked_len(&self) -> Option<usize> {
        self.iterations.checked_mul(self.methods)
    }

    /// Number of tokens in the expected sequence
    ///
    /// Saturates at `usize::MAX`; call [`SequenceShape::validate`] first to
    /// reject shapes whose length overflows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iterations.saturating_mul(self.methods)
    }

    /// Reject shapes whose expected sequence length overflows `usize`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `iterations × methods` overflows
    pub fn validate(&self) -> Result<()> {
        self.checked_len().map(|_| ()).ok_or_else(|| {
            Error::Configuration(format!(
                "expected sequence of {} iterations × {} methods is too long",
                self.iterations, self.methods
            ))
        })
    }

    /// Whether the expected sequence is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expected sequence, iteration-major and method-minor
    ///
    /// For 2 iterations of 2 methods: `m0(0) m1(0) m0(1) m1(1)`.
    #[must_use]
    pub fn expected(&self) -> Vec<InvocationToken> {
        (0..self.iterations)
            .flat_map(|iteration| {
                (0..self.methods).map(move |method| InvocationToken::new(method, iteration))
            })
            .collect()
    }
}

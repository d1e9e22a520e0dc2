//! Pairwise invocation order check
//!
//! A coarser fidelity measure than edit distance: for each run, does the
//! first occurrence of one marker come before the first occurrence of
//! another? Used for protocols where only a single ordering constraint
//! matters, such as a grade being published before students request it.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Result of checking one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOutcome {
    /// The first marker appeared before the second
    Preserved,
    /// The second marker appeared first
    Violated,
    /// At least one marker never appeared
    Missing,
}

/// Expectation that `first` is printed before `then`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCheck {
    first: String,
    then: String,
}

impl OrderCheck {
    /// Expect `first` to occur before `then`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if either marker is empty or both are equal
    pub fn new(first: impl Into<String>, then: impl Into<String>) -> Result<Self> {
        let first = first.into();
        let then = then.into();
        if first.is_empty() || then.is_empty() {
            return Err(Error::Configuration(
                "order markers must not be empty".to_string(),
            ));
        }
        if first == then {
            return Err(Error::Configuration(format!(
                "order markers must differ, both are '{first}'"
            )));
        }
        Ok(Self { first, then })
    }

    /// Marker expected first
    #[must_use]
    pub fn first(&self) -> &str {
        &self.first
    }

    /// Marker expected second
    #[must_use]
    pub fn then(&self) -> &str {
        &self.then
    }

    /// Check one captured run
    #[must_use]
    pub fn check(&self, text: &str) -> OrderOutcome {
        match (text.find(&self.first), text.find(&self.then)) {
            (Some(a), Some(b)) if a < b => OrderOutcome::Preserved,
            (Some(_), Some(_)) => OrderOutcome::Violated,
            _ => OrderOutcome::Missing,
        }
    }

    /// Check every run and count the outcomes
    #[must_use]
    pub fn tally<S: AsRef<str>>(&self, outputs: &[S]) -> OrderTally {
        let mut tally = OrderTally::default();
        for (run, output) in outputs.iter().enumerate() {
            match self.check(output.as_ref()) {
                OrderOutcome::Preserved => tally.preserved += 1,
                OrderOutcome::Violated => tally.violated += 1,
                OrderOutcome::Missing => {
                    tracing::warn!(
                        run = run + 1,
                        first = %self.first,
                        then = %self.then,
                        "run did not print both order markers"
                    );
                    tally.missing += 1;
                }
            }
        }
        tally
    }
}

/// Outcome counts over many runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTally {
    /// Runs where the order held
    pub preserved: usize,
    /// Runs where the order was reversed
    pub violated: usize,
    /// Runs missing a marker
    pub missing: usize,
}

impl OrderTally {
    /// Number of runs checked
    #[must_use]
    pub fn total(&self) -> usize {
        self.preserved + self.violated + self.missing
    }

    /// Fraction of decidable runs that violated the order
    ///
    /// Runs with a missing marker are excluded; returns 0 when no run was decidable.
    #[must_use]
    pub fn violation_rate(&self) -> f64 {
        let decided = self.preserved + self.violated;
        if decided == 0 {
            0.0
        } else {
            self.violated as f64 / decided as f64
        }
    }
}

//! Sequence fidelity scoring
//!
//! Scores how far an observed invocation order is from the order a correct
//! schedule produces. The distance is the classic Levenshtein distance over
//! whole tokens: two tokens are equal only if both the method and the
//! iteration match. Small differences matter here (enforcement bringing 40
//! edits down to 2 is the evidence being collected), so the full dynamic
//! programming table is always computed.

pub mod order;

pub use order::{OrderCheck, OrderOutcome, OrderTally};

use serde::{Deserialize, Serialize};

use crate::trace::{extract_invocations, InvocationToken, SequenceShape};
use crate::{Error, Result};

/// Minimum number of single-token insertions, deletions or substitutions
/// turning `observed` into `expected`
///
/// Uses a flat `(observed.len() + 1) × (expected.len() + 1)` table with unit
/// costs.
///
/// # Errors
///
/// Returns [`Error::Analysis`] if the table size overflows `usize`
pub fn edit_distance<T: PartialEq>(observed: &[T], expected: &[T]) -> Result<usize> {
    let rows = observed.len().saturating_add(1);
    let cols = expected.len().saturating_add(1);
    let size = rows.checked_mul(cols).ok_or_else(|| {
        Error::Analysis(format!(
            "edit distance table for {} observed × {} expected tokens is too large",
            observed.len(),
            expected.len()
        ))
    })?;
    let mut table = vec![0usize; size];

    for (i, cell) in table.iter_mut().step_by(cols).enumerate() {
        *cell = i;
    }
    for (j, cell) in table.iter_mut().take(cols).enumerate() {
        *cell = j;
    }

    for i in 1..rows {
        for j in 1..cols {
            let substitution = usize::from(observed[i - 1] != expected[j - 1]);
            let replace = table[(i - 1) * cols + (j - 1)] + substitution;
            let delete = table[(i - 1) * cols + j] + 1;
            let insert = table[i * cols + (j - 1)] + 1;
            table[i * cols + j] = replace.min(delete).min(insert);
        }
    }

    Ok(table[size - 1])
}

/// Fidelity of one observed trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FidelityScore {
    /// Levenshtein distance to the expected sequence
    pub edit_distance: usize,
    /// Length of the expected sequence
    pub reference_length: usize,
    /// `edit_distance / reference_length`, or 0 for an empty reference
    pub relative_edit_rate: f64,
}

impl FidelityScore {
    /// Score an observed sequence against the expected one
    ///
    /// # Errors
    ///
    /// Returns [`Error::Analysis`] if the sequences are too long to compare
    pub fn compute(observed: &[InvocationToken], expected: &[InvocationToken]) -> Result<Self> {
        let distance = edit_distance(observed, expected)?;
        let reference_length = expected.len();

        let relative_edit_rate = if reference_length == 0 {
            tracing::warn!(
                observed = observed.len(),
                "expected sequence is empty; reporting a relative edit rate of 0"
            );
            0.0
        } else {
            distance as f64 / reference_length as f64
        };

        Ok(Self {
            edit_distance: distance,
            reference_length,
            relative_edit_rate,
        })
    }

    /// Whether the observed sequence matched exactly
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.edit_distance == 0
    }
}

/// Fidelity of all runs of one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidelityReport {
    /// Per-run scores, in run order
    pub scores: Vec<FidelityScore>,
    /// Number of runs scored
    pub runs: usize,
    /// Arithmetic mean of the edit distances
    pub mean_edit_distance: f64,
    /// Arithmetic mean of the relative edit rates
    pub mean_relative_edit_rate: f64,
    /// Length of the expected sequence shared by all runs
    pub reference_length: usize,
}

impl FidelityReport {
    /// Number of runs that matched the expected sequence exactly
    #[must_use]
    pub fn exact_runs(&self) -> usize {
        self.scores.iter().filter(|s| s.is_exact()).count()
    }
}

/// Scores captured runs against one fixed expected sequence
#[derive(Debug, Clone)]
pub struct FidelityAnalyzer {
    shape: SequenceShape,
    expected: Vec<InvocationToken>,
}

impl FidelityAnalyzer {
    /// Analyzer for the sequence of the given shape
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the shape's length overflows
    pub fn new(shape: SequenceShape) -> Result<Self> {
        shape.validate()?;
        Ok(Self {
            shape,
            expected: shape.expected(),
        })
    }

    /// Shape of the expected sequence
    #[must_use]
    pub fn shape(&self) -> SequenceShape {
        self.shape
    }

    /// The expected sequence
    #[must_use]
    pub fn expected(&self) -> &[InvocationToken] {
        &self.expected
    }

    /// Score an already extracted sequence
    ///
    /// # Errors
    ///
    /// See [`FidelityScore::compute`]
    pub fn score(&self, observed: &[InvocationToken]) -> Result<FidelityScore> {
        FidelityScore::compute(observed, &self.expected)
    }

    /// Extract invocations from raw output and score them
    ///
    /// # Errors
    ///
    /// See [`FidelityScore::compute`]
    pub fn score_output(&self, output: &str) -> Result<FidelityScore> {
        self.score(&extract_invocations(output))
    }

    /// Score every run and average the results
    ///
    /// # Errors
    ///
    /// Returns [`Error::Analysis`] when there are no runs to score or a run is
    /// too long to compare
    pub fn report<S: AsRef<str>>(&self, outputs: &[S]) -> Result<FidelityReport> {
        if outputs.is_empty() {
            return Err(Error::Analysis(
                "no captured runs to score; enable trace capture for this configuration"
                    .to_string(),
            ));
        }

        let scores = outputs
            .iter()
            .map(|output| self.score_output(output.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let runs = scores.len() as f64;
        let mean_edit_distance = scores.iter().map(|s| s.edit_distance as f64).sum::<f64>() / runs;
        let mean_relative_edit_rate =
            scores.iter().map(|s| s.relative_edit_rate).sum::<f64>() / runs;

        tracing::debug!(
            runs = scores.len(),
            reference_length = self.expected.len(),
            mean_edit_distance,
            "fidelity computed"
        );

        Ok(FidelityReport {
            runs: scores.len(),
            scores,
            mean_edit_distance,
            mean_relative_edit_rate,
            reference_length: self.expected.len(),
        })
    }
}

//! Plain versus enforced comparison
//!
//! Puts the summaries of the two variants side by side and expresses the cost
//! of enforcement as a relative increase in percent over the plain variant.

use serde::{Deserialize, Serialize};

use crate::fidelity::FidelityReport;
use crate::measurement::MeasurementSummary;

/// `(enforced - plain) / plain * 100`, or `None` for a zero baseline
#[must_use]
pub fn relative_increase(plain: f64, enforced: f64) -> Option<f64> {
    if plain == 0.0 {
        return None;
    }
    Some((enforced - plain) / plain * 100.0)
}

/// Relative increase of every metric, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelativeIncrease {
    /// Wall-clock time
    pub real_time: Option<f64>,
    /// User-mode time
    pub user_time: Option<f64>,
    /// Kernel-mode time
    pub sys_time: Option<f64>,
    /// Peak resident memory
    pub peak_resident: Option<f64>,
}

/// Both variants of one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantComparison {
    /// Summary without enforcement
    pub plain: MeasurementSummary,
    /// Summary with enforcement
    pub enforced: MeasurementSummary,
    /// Fidelity without enforcement, if traces were scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plain_fidelity: Option<FidelityReport>,
    /// Fidelity with enforcement, if traces were scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforced_fidelity: Option<FidelityReport>,
}

impl VariantComparison {
    /// Compare two measured variants
    #[must_use]
    pub fn new(plain: MeasurementSummary, enforced: MeasurementSummary) -> Self {
        Self {
            plain,
            enforced,
            plain_fidelity: None,
            enforced_fidelity: None,
        }
    }

    /// Attach fidelity reports for both variants
    #[must_use]
    pub fn with_fidelity(mut self, plain: FidelityReport, enforced: FidelityReport) -> Self {
        self.plain_fidelity = Some(plain);
        self.enforced_fidelity = Some(enforced);
        self
    }

    /// Cost of enforcement for every metric
    #[must_use]
    pub fn relative_increase(&self) -> RelativeIncrease {
        let (p, e) = (&self.plain, &self.enforced);
        let increase = RelativeIncrease {
            real_time: relative_increase(p.mean_real_time_seconds, e.mean_real_time_seconds),
            user_time: relative_increase(p.mean_user_time_seconds, e.mean_user_time_seconds),
            sys_time: relative_increase(p.mean_sys_time_seconds, e.mean_sys_time_seconds),
            peak_resident: relative_increase(p.mean_peak_resident_kb, e.mean_peak_resident_kb),
        };
        if increase.user_time.is_none() || increase.peak_resident.is_none() {
            tracing::debug!(
                plain = %p.label,
                "plain variant has a zero baseline; relative increase undefined"
            );
        }
        increase
    }

    /// Mean edits removed by enforcement, when both variants were scored
    #[must_use]
    pub fn edit_reduction(&self) -> Option<f64> {
        match (&self.plain_fidelity, &self.enforced_fidelity) {
            (Some(plain), Some(enforced)) => {
                Some(plain.mean_edit_distance - enforced.mean_edit_distance)
            }
            _ => None,
        }
    }
}

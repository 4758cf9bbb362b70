//! Retention policy for finished segments.
//!
//! A segment is kept when its peak stands far enough above its own average, or when the
//! peak alone clears the squelch floor. Both thresholds are empirically tuned.

use crate::power::PowerSummary;
use crate::prelude::CaptureConfiguration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquelchPolicy {
    pub squelch_dbfs: f64,
    pub min_peak_gap_dbfs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquelchDecision {
    pub retain: bool,
    pub peak_gap_db: f64,
}

impl SquelchPolicy {
    pub fn new(squelch_dbfs: f64, min_peak_gap_dbfs: f64) -> Self {
        Self {
            squelch_dbfs,
            min_peak_gap_dbfs,
        }
    }

    pub fn from_config(config: &CaptureConfiguration) -> Self {
        Self::new(config.squelch_dbfs, config.min_peak_gap_dbfs)
    }

    pub fn decide(&self, summary: &PowerSummary) -> SquelchDecision {
        let peak_gap_db = summary.peak_gap_db();
        let retain =
            peak_gap_db >= self.min_peak_gap_dbfs || summary.max_power_dbfs > self.squelch_dbfs;
        SquelchDecision {
            retain,
            peak_gap_db,
        }
    }
}

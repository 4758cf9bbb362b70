use crate::prelude::{CaptureError, CaptureResult};
use crate::telemetry::TelemetryRecord;
use chrono::{DateTime, Utc};

/// Starting value for the running peak, below anything the radio reports.
pub const POWER_FLOOR_DBFS: f64 = -200.0;

/// Running power aggregate over one segment's telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureStats {
    pub max_power_dbfs: f64,
    pub total_power: f64,
    pub sample_count: usize,
    pub capture_start: Option<DateTime<Utc>>,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self {
            max_power_dbfs: POWER_FLOOR_DBFS,
            total_power: 0.0,
            sample_count: 0,
            capture_start: None,
        }
    }

    pub fn record_power(&mut self, power_dbfs: f64) {
        self.max_power_dbfs = self.max_power_dbfs.max(power_dbfs);
        self.total_power += power_dbfs;
        self.sample_count += 1;
    }

    pub fn average_power_dbfs(&self) -> Option<f64> {
        if self.sample_count == 0 {
            return None;
        }
        Some(self.total_power / self.sample_count as f64)
    }

    /// Finalizes the aggregate. A segment without telemetry is a broken capture, not a quiet one.
    pub fn summary(&self) -> CaptureResult<PowerSummary> {
        let average_power_dbfs = self.average_power_dbfs().ok_or(CaptureError::NoTelemetry)?;
        Ok(PowerSummary {
            max_power_dbfs: self.max_power_dbfs,
            average_power_dbfs,
            sample_count: self.sample_count,
            capture_start: self.capture_start,
        })
    }
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Finalized power figures of a segment with at least one telemetry record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSummary {
    pub max_power_dbfs: f64,
    pub average_power_dbfs: f64,
    pub sample_count: usize,
    pub capture_start: Option<DateTime<Utc>>,
}

impl PowerSummary {
    /// How far the peak stands above the segment's average.
    pub fn peak_gap_db(&self) -> f64 {
        self.max_power_dbfs - self.average_power_dbfs
    }
}

/// Folds telemetry records into [`CaptureStats`] as they stream in.
#[derive(Debug, Clone, Default)]
pub struct PowerAccumulator {
    stats: CaptureStats,
}

impl PowerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, record: &TelemetryRecord) {
        self.observe_at(record, Utc::now());
    }

    pub fn observe_at(&mut self, record: &TelemetryRecord, at: DateTime<Utc>) {
        if self.stats.capture_start.is_none() {
            self.stats.capture_start = Some(at);
        }
        self.stats.record_power(record.average_power_dbfs);
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn finalize(&self) -> CaptureResult<PowerSummary> {
        self.stats.summary()
    }

    pub fn into_stats(self) -> CaptureStats {
        self.stats
    }
}

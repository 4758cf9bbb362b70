use crate::power::{CaptureStats, PowerSummary};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Free-form description of the receive chain, recorded in every metadata sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareDescription {
    pub hardware: String,
    pub author: String,
    pub antenna_type: String,
    pub sdr: String,
    pub lna: String,
    pub lna_power: String,
}

impl Default for HardwareDescription {
    fn default() -> Self {
        Self {
            hardware: "HackRF, LNA, antenna".into(),
            author: "SAR Recorder Team".into(),
            antenna_type: "Wideband".into(),
            sdr: "HackRF".into(),
            lna: "6GHz 20dB".into(),
            lna_power: "bias-tee".into(),
        }
    }
}

/// Immutable parameters for one recording run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    pub center_freq_mhz: f64,
    pub sample_rate_hz: u64,
    /// Baseband filter width; the sample rate is used when unset.
    pub baseband_filter_hz: Option<u64>,
    pub duration_secs: u64,
    pub if_gain_db: u32,
    pub baseband_gain_db: u32,
    pub amp_enabled: bool,
    pub serial: Option<String>,
    pub squelch_dbfs: f64,
    pub min_peak_gap_dbfs: f64,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub program: String,
    pub banner_lines: usize,
    pub watchdog_grace_secs: u64,
    pub stem_prefix: String,
    pub hardware: HardwareDescription,
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            center_freq_mhz: 5405.5,
            sample_rate_hz: 20_000_000,
            baseband_filter_hz: None,
            duration_secs: 15,
            if_gain_db: 40,
            baseband_gain_db: 24,
            amp_enabled: true,
            serial: None,
            squelch_dbfs: -29.0,
            min_peak_gap_dbfs: 1.1,
            output_dir: PathBuf::from("."),
            temp_dir: PathBuf::from("."),
            program: "hackrf_transfer".into(),
            banner_lines: 7,
            watchdog_grace_secs: 30,
            stem_prefix: "hrf_sar".into(),
            hardware: HardwareDescription::default(),
        }
    }
}

impl CaptureConfiguration {
    pub fn center_freq_hz(&self) -> u64 {
        (self.center_freq_mhz * 1e6).round() as u64
    }

    pub fn filter_bandwidth_hz(&self) -> u64 {
        self.baseband_filter_hz.unwrap_or(self.sample_rate_hz)
    }

    /// Total sample count handed to the capture tool.
    pub fn sample_count(&self) -> u64 {
        self.duration_secs.saturating_mul(self.sample_rate_hz)
    }

    pub fn band(&self) -> FrequencyBand {
        FrequencyBand::around(self.center_freq_hz(), self.filter_bandwidth_hz())
    }

    /// Stem shared by every segment of the run, e.g. `hrf_sar_5405_15s`.
    pub fn base_stem(&self) -> String {
        format!(
            "{}_{}_{}s",
            self.stem_prefix,
            self.center_freq_mhz.trunc() as u64,
            self.duration_secs
        )
    }

    /// Deadline for a single capture before the watchdog kills the process.
    pub fn watchdog(&self) -> Duration {
        Duration::from_secs(self.duration_secs.saturating_add(self.watchdog_grace_secs))
    }

    /// Checks everything a run needs before the first capture starts.
    pub fn validate(&self, needs_temp_dir: bool) -> CaptureResult<()> {
        if !self.output_dir.is_dir() {
            return Err(CaptureError::Configuration(format!(
                "out_path {} does not exist",
                self.output_dir.display()
            )));
        }
        if needs_temp_dir && !self.temp_dir.is_dir() {
            return Err(CaptureError::Configuration(format!(
                "tmp_path {} does not exist",
                self.temp_dir.display()
            )));
        }
        if self.duration_secs == 0 || self.sample_rate_hz == 0 {
            return Err(CaptureError::Configuration(
                "duration and sample rate must be positive".into(),
            ));
        }
        if self.center_freq_mhz <= 0.0 {
            return Err(CaptureError::Configuration(
                "center frequency must be positive".into(),
            ));
        }
        if self.duration_secs.checked_mul(self.sample_rate_hz).is_none() {
            return Err(CaptureError::Configuration(format!(
                "{} s at {} Hz is more samples than can be counted",
                self.duration_secs, self.sample_rate_hz
            )));
        }
        let watchdog_fits = self
            .duration_secs
            .checked_add(self.watchdog_grace_secs)
            .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)))
            .is_some();
        if !watchdog_fits {
            return Err(CaptureError::Configuration(format!(
                "watchdog grace of {} s is out of range",
                self.watchdog_grace_secs
            )));
        }
        Ok(())
    }
}

/// Occupied band of one capture, in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub lower_edge_hz: u64,
    pub upper_edge_hz: u64,
    pub center_hz: u64,
}

impl FrequencyBand {
    pub fn around(center_hz: u64, bandwidth_hz: u64) -> Self {
        let half = bandwidth_hz / 2;
        Self {
            lower_edge_hz: center_hz.saturating_sub(half),
            upper_edge_hz: center_hz.saturating_add(half),
            center_hz,
        }
    }
}

/// Raw result of running the capture tool once.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: Option<Duration>,
    pub stats: CaptureStats,
    pub lines_seen: usize,
}

impl CaptureOutcome {
    /// Finalized power figures, or the reason this capture counts as failed.
    pub fn verdict(&self) -> CaptureResult<PowerSummary> {
        if let Some(limit) = self.timed_out {
            return Err(CaptureError::Timeout(limit));
        }
        if self.exit_code != Some(0) {
            return Err(CaptureError::ProcessFailed {
                code: self.exit_code,
            });
        }
        self.stats.summary()
    }
}

/// Common error type for the capture pipeline.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("reading capture status stream: {0}")]
    Stream(#[source] io::Error),
    #[error("capture process exited with code {code:?}")]
    ProcessFailed { code: Option<i32> },
    #[error("capture process outlived its {0:?} watchdog and was killed")]
    Timeout(Duration),
    #[error("capture produced no telemetry records")]
    NoTelemetry,
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    Promotion {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to delete {}: {source}", .path.display())]
    Removal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("refusing to overwrite existing {}", .0.display())]
    DestinationExists(PathBuf),
    #[error("data file {} missing before metadata write", .0.display())]
    MissingDataFile(PathBuf),
    #[error("writing metadata {}: {source}", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serializing metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CaptureError {
    /// The capture itself went wrong; the segment is discarded and the run continues.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            Self::Stream(_) | Self::ProcessFailed { .. } | Self::Timeout(_) | Self::NoTelemetry
        )
    }

    /// Moving, deleting or describing the backing file failed; the file stays for inspection.
    pub fn is_transition_failure(&self) -> bool {
        matches!(
            self,
            Self::Promotion { .. }
                | Self::Removal { .. }
                | Self::DestinationExists(_)
                | Self::MissingDataFile(_)
                | Self::Metadata { .. }
                | Self::Serialize(_)
        )
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Seam between the acquisition loop and whatever produces a segment's data file.
pub trait SegmentCapture {
    /// Record one segment into `data_path`, returning once the producer has finished writing.
    fn capture(&mut self, data_path: &Path) -> CaptureResult<CaptureOutcome>;
    /// Invocation recorded in the metadata sidecar.
    fn command_line(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_hackrf_geometry() {
        let cfg = CaptureConfiguration::default();
        assert_eq!(cfg.center_freq_hz(), 5_405_500_000);
        assert_eq!(cfg.sample_count(), 300_000_000);
        assert_eq!(cfg.base_stem(), "hrf_sar_5405_15s");
        assert_eq!(cfg.watchdog(), Duration::from_secs(45));
    }

    #[test]
    fn band_spans_filter_width() {
        let cfg = CaptureConfiguration::default();
        let band = cfg.band();
        assert_eq!(band.lower_edge_hz, 5_395_500_000);
        assert_eq!(band.upper_edge_hz, 5_415_500_000);
        assert_eq!(band.center_hz, 5_405_500_000);
    }

    #[test]
    fn zero_duration_is_a_configuration_error() {
        let cfg = CaptureConfiguration {
            duration_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(false),
            Err(CaptureError::Configuration(_))
        ));
        assert!(CaptureConfiguration::default().validate(true).is_ok());
    }

    #[test]
    fn oversized_duration_or_grace_is_a_configuration_error() {
        let long = CaptureConfiguration {
            duration_secs: 1_000_000_000_000,
            ..Default::default()
        };
        assert!(matches!(
            long.validate(false),
            Err(CaptureError::Configuration(_))
        ));
        assert_eq!(long.sample_count(), u64::MAX);

        let patient = CaptureConfiguration {
            watchdog_grace_secs: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(
            patient.validate(false),
            Err(CaptureError::Configuration(_))
        ));
        assert_eq!(patient.watchdog(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn nonzero_exit_is_failure_even_with_telemetry() {
        let mut stats = CaptureStats::new();
        stats.record_power(-2.0);
        let outcome = CaptureOutcome {
            exit_code: Some(1),
            timed_out: None,
            stats,
            lines_seen: 9,
        };
        let err = outcome.verdict().unwrap_err();
        assert!(matches!(err, CaptureError::ProcessFailed { code: Some(1) }));
        assert!(err.is_capture_failure());
    }

    #[test]
    fn timeout_takes_precedence() {
        let outcome = CaptureOutcome {
            exit_code: None,
            timed_out: Some(Duration::from_secs(3)),
            stats: CaptureStats::new(),
            lines_seen: 0,
        };
        assert!(matches!(outcome.verdict(), Err(CaptureError::Timeout(_))));
    }
}

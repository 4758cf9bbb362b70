//! Drives segment after segment: capture, decide, then promote or discard.
//!
//! Segments run strictly one after another with no pause in between, so no window of
//! signal is lost. A failed capture only costs its own segment; a capture tool that cannot
//! be started at all ends the run.

use crate::power::PowerSummary;
use crate::prelude::{CaptureConfiguration, CaptureError, CaptureResult, SegmentCapture};
use crate::segment::{MetadataTemplate, PromotedSegment, Segment, SegmentLifecycle, StemGenerator};
use crate::squelch::SquelchPolicy;
use crate::telemetry::{LogManager, MetricsRecorder, RunSummary};
use chrono::Utc;
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// One segment into the output directory, kept regardless of power.
    SingleShot,
    /// Back-to-back squelched segments until stopped or `max_segments` have run.
    Continuous { max_segments: Option<usize> },
}

#[derive(Debug)]
pub enum Disposition {
    Retained(PromotedSegment),
    Discarded,
    /// The capture failed and its file was removed.
    CaptureFailed(CaptureError),
    /// Moving or deleting the file failed; it is still on disk for inspection.
    Stranded(CaptureError),
}

#[derive(Debug)]
pub struct SegmentReport {
    pub segment: Segment,
    pub summary: Option<PowerSummary>,
    pub disposition: Disposition,
}

impl SegmentReport {
    pub fn retained(&self) -> bool {
        matches!(self.disposition, Disposition::Retained(_))
    }
}

#[derive(Clone, Copy)]
enum Retention {
    Always,
    Squelch(SquelchPolicy),
}

pub struct AcquisitionLoop<C> {
    capture: C,
    config: CaptureConfiguration,
    policy: SquelchPolicy,
    lifecycle: SegmentLifecycle,
    stems: StemGenerator,
    metrics: MetricsRecorder,
}

impl<C: SegmentCapture> AcquisitionLoop<C> {
    pub fn new(config: CaptureConfiguration, capture: C) -> Self {
        let template = MetadataTemplate::new(&config, &capture.command_line());
        Self {
            policy: SquelchPolicy::from_config(&config),
            lifecycle: SegmentLifecycle::new(template),
            stems: StemGenerator::from_config(&config),
            metrics: MetricsRecorder::new(),
            capture,
            config,
        }
    }

    pub fn metrics(&self) -> RunSummary {
        self.metrics.snapshot()
    }

    pub fn run(&mut self, mode: AcquisitionMode, stop: &AtomicBool) -> CaptureResult<RunSummary> {
        match mode {
            AcquisitionMode::SingleShot => match self.run_single()?.disposition {
                Disposition::CaptureFailed(err) | Disposition::Stranded(err) => Err(err),
                Disposition::Retained(_) | Disposition::Discarded => Ok(self.metrics()),
            },
            AcquisitionMode::Continuous { max_segments } => {
                self.run_continuous(max_segments, stop)
            }
        }
    }

    /// Captures one segment straight into the output directory under the next free `_NNNN` stem.
    pub fn run_single(&mut self) -> CaptureResult<SegmentReport> {
        let output_dir = self.config.output_dir.clone();
        let stem = self.stems.sequenced(&output_dir);
        let segment = Segment::new(stem, &output_dir, &output_dir, Utc::now(), self.config.band());
        self.cycle(segment, Retention::Always)
    }

    pub fn run_continuous(
        &mut self,
        max_segments: Option<usize>,
        stop: &AtomicBool,
    ) -> CaptureResult<RunSummary> {
        let temp_dir = self.config.temp_dir.clone();
        let output_dir = self.config.output_dir.clone();
        let retention = Retention::Squelch(self.policy);
        let mut completed = 0;

        while max_segments.map_or(true, |limit| completed < limit) {
            if stop.load(Ordering::SeqCst) {
                info!("stop requested, ending acquisition");
                break;
            }
            let start = Utc::now();
            let stem = self
                .stems
                .timestamped(start, &[temp_dir.as_path(), output_dir.as_path()]);
            let segment = Segment::new(stem, &temp_dir, &output_dir, start, self.config.band());
            self.cycle(segment, retention)?;
            completed += 1;
            info!("{}", self.metrics.snapshot());
        }

        Ok(self.metrics.snapshot())
    }

    fn cycle(&mut self, segment: Segment, retention: Retention) -> CaptureResult<SegmentReport> {
        let log = LogManager::new(segment.file_stem.as_str());
        self.metrics.record_segment();

        let verdict = match self.capture.capture(&segment.temporary_path) {
            Ok(outcome) => outcome.verdict(),
            Err(err) if err.is_capture_failure() => Err(err),
            Err(err) => {
                log.error(&format!("cannot capture: {}", err));
                return Err(err);
            }
        };

        let summary = match verdict {
            Ok(summary) => summary,
            Err(err) => {
                log.warn(&format!("capture failed ({}), discarding segment", err));
                self.metrics.record_capture_failure();
                let disposition = match self.lifecycle.discard(&segment) {
                    Ok(()) => Disposition::CaptureFailed(err),
                    Err(removal) => self.strand(&log, removal),
                };
                return Ok(SegmentReport {
                    segment,
                    summary: None,
                    disposition,
                });
            }
        };

        let retain = match retention {
            Retention::Always => true,
            Retention::Squelch(policy) => {
                let decision = policy.decide(&summary);
                log.record(&format!(
                    "check (peak > squelch): {:.2} > {} or (peak - avg) {:.2} >= {}",
                    summary.max_power_dbfs,
                    policy.squelch_dbfs,
                    decision.peak_gap_db,
                    policy.min_peak_gap_dbfs
                ));
                decision.retain
            }
        };

        let disposition = if retain {
            log.record(&format!(
                "moving {} to {} ...",
                segment.temporary_path.display(),
                segment.final_data_path.display()
            ));
            match self.lifecycle.promote(&segment, &summary) {
                Ok(promoted) => {
                    log.record(&format!("wrote {}", promoted.metadata_path.display()));
                    self.metrics.record_retained();
                    Disposition::Retained(promoted)
                }
                Err(err) => self.strand(&log, err),
            }
        } else {
            log.record(&format!("deleting {} ...", segment.temporary_path.display()));
            match self.lifecycle.discard(&segment) {
                Ok(()) => {
                    self.metrics.record_discarded();
                    Disposition::Discarded
                }
                Err(err) => self.strand(&log, err),
            }
        };

        Ok(SegmentReport {
            segment,
            summary: Some(summary),
            disposition,
        })
    }

    fn strand(&self, log: &LogManager, err: CaptureError) -> Disposition {
        log.error(&format!("{}; leaving file in place", err));
        self.metrics.record_transition_failure();
        Disposition::Stranded(err)
    }
}

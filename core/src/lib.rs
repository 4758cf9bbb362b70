//! Capture, telemetry and squelch pipeline for continuous HackRF SAR recording.
//!
//! Each segment runs an external `hackrf_transfer` process, folds its power reports into
//! running statistics, decides whether the segment holds a signal, and then either promotes
//! the data file with a SigMF sidecar or deletes it.

pub mod acquisition;
pub mod capture;
pub mod power;
pub mod prelude;
pub mod segment;
pub mod squelch;
pub mod telemetry;

pub use acquisition::{AcquisitionLoop, AcquisitionMode, Disposition, SegmentReport};
pub use prelude::{CaptureConfiguration, CaptureError, CaptureResult, SegmentCapture};

pub mod accumulator;

pub use accumulator::{CaptureStats, PowerAccumulator, PowerSummary};

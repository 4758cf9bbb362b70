pub mod log;
pub mod metrics;
pub mod parser;

pub use log::LogManager;
pub use metrics::{MetricsRecorder, RunSummary};
pub use parser::{TelemetryParser, TelemetryRecord};

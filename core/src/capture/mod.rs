pub mod command;
pub mod runner;

pub use command::CaptureCommand;
pub use runner::CaptureRunner;

use crate::prelude::{CaptureConfiguration, CaptureOutcome, CaptureResult, SegmentCapture};
use std::path::Path;

/// Segments recorded by an external `hackrf_transfer` process.
pub struct HackRfCapture {
    command: CaptureCommand,
    runner: CaptureRunner,
}

impl HackRfCapture {
    pub fn new(command: CaptureCommand, runner: CaptureRunner) -> Self {
        Self { command, runner }
    }

    pub fn from_config(config: &CaptureConfiguration) -> Self {
        Self::new(
            CaptureCommand::hackrf_transfer(config),
            CaptureRunner::from_config(config),
        )
    }
}

impl SegmentCapture for HackRfCapture {
    fn capture(&mut self, data_path: &Path) -> CaptureResult<CaptureOutcome> {
        self.runner.run(&self.command, data_path)
    }

    fn command_line(&self) -> String {
        self.command.to_string()
    }
}

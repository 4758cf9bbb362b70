use log::{error, info, warn};

/// Progress log for one segment; every message carries the segment's file stem.
pub struct LogManager {
    stem: String,
}

impl LogManager {
    pub fn new(stem: impl Into<String>) -> Self {
        Self { stem: stem.into() }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.stem, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.stem, message);
    }

    pub fn error(&self, message: &str) {
        error!("[{}] {}", self.stem, message);
    }
}

use std::fmt;
use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<RunSummary>,
}

/// Segment counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub segments: usize,
    pub retained: usize,
    pub discarded: usize,
    pub capture_failures: usize,
    pub transition_failures: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "segments={} retained={} discarded={} capture_failures={} transition_failures={}",
            self.segments,
            self.retained,
            self.discarded,
            self.capture_failures,
            self.transition_failures
        )
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RunSummary::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut RunSummary)) {
        if let Ok(mut summary) = self.inner.lock() {
            apply(&mut summary);
        }
    }

    pub fn record_segment(&self) {
        self.update(|s| s.segments += 1);
    }

    pub fn record_retained(&self) {
        self.update(|s| s.retained += 1);
    }

    pub fn record_discarded(&self) {
        self.update(|s| s.discarded += 1);
    }

    pub fn record_capture_failure(&self) {
        self.update(|s| s.capture_failures += 1);
    }

    pub fn record_transition_failure(&self) {
        self.update(|s| s.transition_failures += 1);
    }

    pub fn snapshot(&self) -> RunSummary {
        self.inner.lock().map(|s| *s).unwrap_or_default()
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let metrics = MetricsRecorder::new();
        metrics.record_segment();
        metrics.record_segment();
        metrics.record_retained();
        metrics.record_capture_failure();
        metrics.record_discarded();

        let summary = metrics.snapshot();
        assert_eq!(summary.segments, 2);
        assert_eq!(summary.retained, 1);
        assert_eq!(summary.discarded, 1);
        assert_eq!(summary.capture_failures, 1);
        assert_eq!(summary.transition_failures, 0);
        assert!(summary.to_string().starts_with("segments=2 retained=1"));
    }
}

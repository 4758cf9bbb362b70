use crate::workflow::config::RecorderConfig;
use anyhow::Context;
use sarcore::capture::HackRfCapture;
use sarcore::telemetry::RunSummary;
use sarcore::{AcquisitionLoop, SegmentCapture};
use std::sync::atomic::AtomicBool;

#[derive(Clone)]
pub struct Recorder {
    config: RecorderConfig,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self, stop: &AtomicBool) -> anyhow::Result<RunSummary> {
        let capture = HackRfCapture::from_config(&self.config.capture);
        self.execute_with(capture, stop)
    }

    pub fn execute_with<C: SegmentCapture>(
        &self,
        capture: C,
        stop: &AtomicBool,
    ) -> anyhow::Result<RunSummary> {
        let mut acquisition = AcquisitionLoop::new(self.config.capture.clone(), capture);
        acquisition
            .run(self.config.mode(), stop)
            .context("acquisition aborted")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use sarcore::prelude::CaptureConfiguration;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Writing a script while another test forks can leave it busy for exec.
    static SCRIPT_LOCK: Mutex<()> = Mutex::new(());

    /// Stand-in for `hackrf_transfer`: prints a banner and a few power reports, then writes `-r`.
    fn fake_hackrf(dir: &Path, powers: &[f64], exit_code: i32) -> String {
        let mut script = String::from(
            "#!/bin/sh\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-r\" ]; then out=\"$2\"; fi\n  shift\ndone\n",
        );
        for line in 0..7 {
            script.push_str(&format!("echo 'banner line {line}' >&2\n"));
        }
        for power in powers {
            script.push_str(&format!(
                "echo '20.0 MiB / 1.000 sec = 20.0 MiB/second, average power {power:.1} dBfs, 8192 bytes free in buffer, 0 overruns, longest 0 bytes' >&2\n"
            ));
        }
        script.push_str(&format!("printf 'iq' > \"$out\"\nexit {exit_code}\n"));

        let path = dir.join("hackrf_transfer");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    fn config(tmp: &Path, out: &Path, program: String) -> RecorderConfig {
        RecorderConfig::from_args(
            CaptureConfiguration {
                output_dir: out.to_path_buf(),
                temp_dir: tmp.to_path_buf(),
                program,
                duration_secs: 1,
                ..Default::default()
            },
            false,
            Some(1),
        )
    }

    #[test]
    fn recorder_keeps_burst_end_to_end() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let bin = tempdir().unwrap();
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let program = fake_hackrf(bin.path(), &[-2.0, -5.0, -8.0], 0);

        let recorder = Recorder::new(config(tmp.path(), out.path(), program));
        let summary = recorder.execute(&AtomicBool::new(false)).unwrap();

        assert_eq!(summary.retained, 1);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        let meta = fs::read_dir(out.path())
            .unwrap()
            .filter_map(Result::ok)
            .find(|e| e.path().extension().map_or(false, |x| x == "sigmf-meta"))
            .unwrap();
        let text = fs::read_to_string(meta.path()).unwrap();
        assert!(text.contains("\"hrf_sar:max_power_dbfs\": -2.0"));
        assert!(text.contains("-n 20000000 -B"));
    }

    #[test]
    fn recorder_drops_failed_capture() {
        let _guard = SCRIPT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let bin = tempdir().unwrap();
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let program = fake_hackrf(bin.path(), &[], 2);

        let recorder = Recorder::new(config(tmp.path(), out.path(), program));
        let summary = recorder.execute(&AtomicBool::new(false)).unwrap();

        assert_eq!(summary.capture_failures, 1);
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }
}

use anyhow::Context;
use sarcore::prelude::CaptureConfiguration;
use sarcore::AcquisitionMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    #[serde(flatten)]
    pub capture: CaptureConfiguration,
    pub single_shot: bool,
    pub max_segments: Option<usize>,
}

impl RecorderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading recorder config {}", path_ref.display()))?;
        let config: RecorderConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing recorder config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        capture: CaptureConfiguration,
        single_shot: bool,
        max_segments: Option<usize>,
    ) -> Self {
        Self {
            capture,
            single_shot,
            max_segments,
        }
    }

    pub fn mode(&self) -> AcquisitionMode {
        if self.single_shot {
            AcquisitionMode::SingleShot
        } else {
            AcquisitionMode::Continuous {
                max_segments: self.max_segments,
            }
        }
    }

    /// Fails before any capture starts if a directory is missing or the geometry is empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.capture
            .validate(!self.single_shot)
            .context("invalid recorder configuration")
    }
}

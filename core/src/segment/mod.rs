pub mod lifecycle;
pub mod metadata;
pub mod naming;

pub use lifecycle::{PromotedSegment, SegmentLifecycle};
pub use metadata::{MetadataTemplate, SigmfMetadata};
pub use naming::StemGenerator;

use crate::prelude::FrequencyBand;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Raw complex signed-byte I/Q written by the capture tool.
pub const TEMP_EXTENSION: &str = "cs8";
pub const DATA_EXTENSION: &str = "sigmf-data";
pub const META_EXTENSION: &str = "sigmf-meta";

/// One capture attempt and where its files live.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub file_stem: String,
    pub temporary_path: PathBuf,
    pub final_data_path: PathBuf,
    pub final_metadata_path: PathBuf,
    pub start_time: DateTime<Utc>,
    pub band: FrequencyBand,
}

impl Segment {
    pub fn new(
        file_stem: impl Into<String>,
        temp_dir: &Path,
        output_dir: &Path,
        start_time: DateTime<Utc>,
        band: FrequencyBand,
    ) -> Self {
        let file_stem = file_stem.into();
        Self {
            temporary_path: temp_dir.join(format!("{}.{}", file_stem, TEMP_EXTENSION)),
            final_data_path: output_dir.join(format!("{}.{}", file_stem, DATA_EXTENSION)),
            final_metadata_path: output_dir.join(format!("{}.{}", file_stem, META_EXTENSION)),
            file_stem,
            start_time,
            band,
        }
    }
}

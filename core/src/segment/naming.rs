use super::{DATA_EXTENSION, META_EXTENSION, TEMP_EXTENSION};
use crate::prelude::CaptureConfiguration;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Produces collision-free file stems for a run.
#[derive(Debug, Clone)]
pub struct StemGenerator {
    base: String,
    /// Last timestamped stem handed out and the suffix it carried.
    previous: Option<(String, u32)>,
}

impl StemGenerator {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            previous: None,
        }
    }

    pub fn from_config(config: &CaptureConfiguration) -> Self {
        Self::new(config.base_stem())
    }

    /// `<base>_<YYYYMMDD_HHMMSS>Z`, with `_2`, `_3`, ... appended when the same second was
    /// already issued in this run or the stem is taken in `dirs`.
    pub fn timestamped(&mut self, at: DateTime<Utc>, dirs: &[&Path]) -> String {
        let stem = format!("{}_{}", self.base, compact_timestamp(at));
        let mut suffix = match &self.previous {
            Some((previous, used)) if *previous == stem => used + 1,
            _ => 1,
        };
        loop {
            let candidate = if suffix == 1 {
                stem.clone()
            } else {
                format!("{}_{}", stem, suffix)
            };
            if !stem_in_use(&candidate, dirs) {
                self.previous = Some((stem, suffix));
                return candidate;
            }
            suffix += 1;
        }
    }

    /// First unused `<base>_NNNN` in `dir`, counting from 0001.
    pub fn sequenced(&self, dir: &Path) -> String {
        let mut index = 1u32;
        loop {
            let candidate = format!("{}_{:04}", self.base, index);
            if !stem_in_use(&candidate, &[dir]) {
                return candidate;
            }
            index += 1;
        }
    }
}

/// `2024-09-15T04:28:13Z` becomes `20240915_042813Z`.
pub fn compact_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%SZ").to_string()
}

fn stem_in_use(stem: &str, dirs: &[&Path]) -> bool {
    dirs.iter().any(|dir| {
        [TEMP_EXTENSION, DATA_EXTENSION, META_EXTENSION]
            .iter()
            .any(|ext| dir.join(format!("{}.{}", stem, ext)).exists())
    })
}

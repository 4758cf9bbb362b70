//! Moves a finished segment's data file to its final place, or removes it.
//!
//! After `promote` or `discard` returns `Ok`, exactly one of the temporary and final data
//! files exists. On error the temporary file is left where it was.

use super::metadata::{MetadataTemplate, SigmfMetadata};
use super::Segment;
use crate::power::PowerSummary;
use crate::prelude::{CaptureError, CaptureResult};
use log::debug;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedSegment {
    pub data_path: PathBuf,
    pub metadata_path: PathBuf,
}

pub struct SegmentLifecycle {
    template: MetadataTemplate,
}

impl SegmentLifecycle {
    pub fn new(template: MetadataTemplate) -> Self {
        Self { template }
    }

    /// Moves the data file into the output directory, then writes its metadata sidecar.
    pub fn promote(
        &self,
        segment: &Segment,
        summary: &PowerSummary,
    ) -> CaptureResult<PromotedSegment> {
        move_file(&segment.temporary_path, &segment.final_data_path)?;

        let captured_at = summary.capture_start.unwrap_or(segment.start_time);
        let document = self.template.for_segment(captured_at, summary);
        write_metadata(
            &segment.final_data_path,
            &segment.final_metadata_path,
            &document,
        )?;

        Ok(PromotedSegment {
            data_path: segment.final_data_path.clone(),
            metadata_path: segment.final_metadata_path.clone(),
        })
    }

    /// Deletes the temporary data file. A file the capture never created is already gone.
    pub fn discard(&self, segment: &Segment) -> CaptureResult<()> {
        match fs::remove_file(&segment.temporary_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} was never written", segment.temporary_path.display());
                Ok(())
            }
            Err(source) => Err(CaptureError::Removal {
                path: segment.temporary_path.clone(),
                source,
            }),
        }
    }
}

/// Renames `from` to `to`, falling back to copy-then-delete across filesystems.
pub fn move_file(from: &Path, to: &Path) -> CaptureResult<()> {
    if to.exists() {
        return Err(CaptureError::DestinationExists(to.to_path_buf()));
    }
    match fs::rename(from, to) {
        Ok(()) => return Ok(()),
        Err(err) => debug!(
            "rename {} -> {} failed ({}), copying instead",
            from.display(),
            to.display(),
            err
        ),
    }

    copy_then_remove(from, to, |source: &Path| fs::remove_file(source))
}

/// Copies `from` to `to`, then removes `from` with `remove_source`.
///
/// Whatever fails, at most one of the two files is left behind and it is `from`.
fn copy_then_remove<R>(from: &Path, to: &Path, remove_source: R) -> CaptureResult<()>
where
    R: FnOnce(&Path) -> io::Result<()>,
{
    let promotion_error = |source| CaptureError::Promotion {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if let Err(source) = copy_synced(from, to) {
        let _ = fs::remove_file(to);
        return Err(promotion_error(source));
    }
    if let Err(source) = remove_source(from) {
        let _ = fs::remove_file(to);
        return Err(promotion_error(source));
    }
    Ok(())
}

fn copy_synced(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to)?;
    File::open(to)?.sync_all()
}

/// Writes the sidecar beside its data file. The document lands under a `.part` name first
/// and is renamed into place, so a failed write never leaves a truncated `.sigmf-meta`.
fn write_metadata(data_path: &Path, meta_path: &Path, document: &SigmfMetadata) -> CaptureResult<()> {
    if !data_path.is_file() {
        return Err(CaptureError::MissingDataFile(data_path.to_path_buf()));
    }
    let partial = partial_path(meta_path);
    let result = write_document(&partial, meta_path, document).and_then(|()| {
        fs::rename(&partial, meta_path).map_err(|source| CaptureError::Metadata {
            path: meta_path.to_path_buf(),
            source,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn partial_path(meta_path: &Path) -> PathBuf {
    let mut name = meta_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn write_document(path: &Path, meta_path: &Path, document: &SigmfMetadata) -> CaptureResult<()> {
    let metadata_error = |source| CaptureError::Metadata {
        path: meta_path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(metadata_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, document).map_err(|err| {
        if err.is_io() {
            metadata_error(err.into())
        } else {
            CaptureError::Serialize(err)
        }
    })?;
    writer.write_all(b"\n").map_err(metadata_error)?;
    writer.flush().map_err(metadata_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::CaptureConfiguration;
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use tempfile::tempdir;

    fn lifecycle() -> SegmentLifecycle {
        let cfg = CaptureConfiguration::default();
        SegmentLifecycle::new(MetadataTemplate::new(&cfg, "hackrf_transfer -B"))
    }

    fn segment(temp_dir: &Path, output_dir: &Path) -> Segment {
        let cfg = CaptureConfiguration::default();
        Segment::new(
            "hrf_sar_5405_15s_20240915_042813Z",
            temp_dir,
            output_dir,
            Utc.with_ymd_and_hms(2024, 9, 15, 4, 28, 13).unwrap(),
            cfg.band(),
        )
    }

    fn summary() -> PowerSummary {
        PowerSummary {
            max_power_dbfs: -2.0,
            average_power_dbfs: -5.0,
            sample_count: 15,
            capture_start: None,
        }
    }

    #[test]
    fn promote_moves_data_then_writes_metadata() {
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let seg = segment(tmp.path(), out.path());
        fs::write(&seg.temporary_path, b"iqiqiq").unwrap();

        let promoted = lifecycle().promote(&seg, &summary()).unwrap();

        assert!(!seg.temporary_path.exists());
        assert_eq!(fs::read(&promoted.data_path).unwrap(), b"iqiqiq");
        let meta: Value =
            serde_json::from_str(&fs::read_to_string(&promoted.metadata_path).unwrap()).unwrap();
        assert_eq!(meta["captures"][0]["core:datetime"], "2024-09-15T04:28:13.000000Z");
        assert_eq!(meta["captures"][0]["hrf_sar:max_power_dbfs"], -2.0);
    }

    #[test]
    fn promote_within_one_directory() {
        let out = tempdir().unwrap();
        let seg = segment(out.path(), out.path());
        fs::write(&seg.temporary_path, b"iq").unwrap();
        lifecycle().promote(&seg, &summary()).unwrap();
        assert!(!seg.temporary_path.exists());
        assert!(seg.final_data_path.exists());
        assert!(seg.final_metadata_path.exists());
    }

    #[test]
    fn failed_move_keeps_temporary_file_and_skips_metadata() {
        let tmp = tempdir().unwrap();
        let missing_output = tmp.path().join("not-mounted");
        let seg = segment(tmp.path(), &missing_output);
        fs::write(&seg.temporary_path, b"iq").unwrap();

        let err = lifecycle().promote(&seg, &summary()).unwrap_err();

        assert!(matches!(err, CaptureError::Promotion { .. }));
        assert!(err.is_transition_failure());
        assert!(seg.temporary_path.exists());
        assert!(!seg.final_metadata_path.exists());
    }

    #[test]
    fn existing_destination_is_not_overwritten() {
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let seg = segment(tmp.path(), out.path());
        fs::write(&seg.temporary_path, b"new").unwrap();
        fs::write(&seg.final_data_path, b"old").unwrap();

        let err = lifecycle().promote(&seg, &summary()).unwrap_err();

        assert!(matches!(err, CaptureError::DestinationExists(_)));
        assert_eq!(fs::read(&seg.final_data_path).unwrap(), b"old");
        assert!(seg.temporary_path.exists());
    }

    #[test]
    fn metadata_requires_data_file() {
        let out = tempdir().unwrap();
        let data = out.path().join("absent.sigmf-data");
        let meta = out.path().join("absent.sigmf-meta");
        let cfg = CaptureConfiguration::default();
        let document = MetadataTemplate::new(&cfg, "").for_segment(Utc::now(), &summary());
        let err = write_metadata(&data, &meta, &document).unwrap_err();
        assert!(matches!(err, CaptureError::MissingDataFile(_)));
        assert!(!meta.exists());
    }

    #[test]
    fn discard_removes_temporary_file() {
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let seg = segment(tmp.path(), out.path());
        fs::write(&seg.temporary_path, b"noise").unwrap();

        lifecycle().discard(&seg).unwrap();

        assert!(!seg.temporary_path.exists());
        assert!(!seg.final_data_path.exists());
        assert!(!seg.final_metadata_path.exists());
    }

    #[test]
    fn discard_of_unwritten_file_succeeds() {
        let tmp = tempdir().unwrap();
        let seg = segment(tmp.path(), tmp.path());
        assert!(lifecycle().discard(&seg).is_ok());
    }

    #[test]
    fn discard_failure_is_reported() {
        let tmp = tempdir().unwrap();
        let seg = segment(tmp.path(), tmp.path());
        fs::create_dir(&seg.temporary_path).unwrap();

        let err = lifecycle().discard(&seg).unwrap_err();

        assert!(matches!(err, CaptureError::Removal { .. }));
        assert!(seg.temporary_path.exists());
    }

    #[test]
    fn copy_fallback_moves_between_directories() {
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let from = tmp.path().join("a.cs8");
        let to = out.path().join("a.sigmf-data");
        fs::write(&from, b"payload").unwrap();

        copy_then_remove(&from, &to, |source: &Path| fs::remove_file(source)).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"payload");
    }

    #[test]
    fn copy_fallback_drops_copy_when_source_cannot_be_removed() {
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let from = tmp.path().join("a.cs8");
        let to = out.path().join("a.sigmf-data");
        fs::write(&from, b"payload").unwrap();

        let err = copy_then_remove(&from, &to, |_: &Path| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only mount"))
        })
        .unwrap_err();

        assert!(matches!(err, CaptureError::Promotion { .. }));
        assert_eq!(fs::read(&from).unwrap(), b"payload");
        assert!(!to.exists());
    }

    #[test]
    fn copy_fallback_failure_leaves_no_copy() {
        let tmp = tempdir().unwrap();
        let out = tempdir().unwrap();
        let from = tmp.path().join("not-a-file.cs8");
        fs::create_dir(&from).unwrap();
        let to = out.path().join("a.sigmf-data");

        let err = copy_then_remove(&from, &to, |source: &Path| fs::remove_file(source))
            .unwrap_err();

        assert!(matches!(err, CaptureError::Promotion { .. }));
        assert!(from.exists());
        assert!(!to.exists());
    }

    #[test]
    fn metadata_is_renamed_into_place() {
        let out = tempdir().unwrap();
        let data = out.path().join("seg.sigmf-data");
        let meta = out.path().join("seg.sigmf-meta");
        fs::write(&data, b"iq").unwrap();
        let cfg = CaptureConfiguration::default();
        let document = MetadataTemplate::new(&cfg, "").for_segment(Utc::now(), &summary());

        write_metadata(&data, &meta, &document).unwrap();

        assert!(fs::read_to_string(&meta).unwrap().ends_with("}\n"));
        assert!(!partial_path(&meta).exists());
    }

    #[test]
    fn failed_metadata_write_names_the_sidecar_and_leaves_nothing() {
        let out = tempdir().unwrap();
        let data = out.path().join("seg.sigmf-data");
        let meta = out.path().join("seg.sigmf-meta");
        fs::write(&data, b"iq").unwrap();
        fs::create_dir(&meta).unwrap();
        fs::write(meta.join("occupant"), b"").unwrap();
        let cfg = CaptureConfiguration::default();
        let document = MetadataTemplate::new(&cfg, "").for_segment(Utc::now(), &summary());

        let err = write_metadata(&data, &meta, &document).unwrap_err();

        match err {
            CaptureError::Metadata { path, .. } => assert_eq!(path, meta),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!partial_path(&meta).exists());
    }
}

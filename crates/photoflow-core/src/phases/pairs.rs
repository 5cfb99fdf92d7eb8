use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::Error;
use crate::layout::Layout;
use crate::oracle::{parse_exif_datetime, MetadataOracle, TagValues, TAG_DATE_TIME_ORIGINAL, TAG_MODEL};
use crate::progress::ProgressReporter;
use crate::relocate::{Relocation, RelocationRequest, Relocator};

/// Largest timestamp difference, in seconds, still accepted for a RAW+JPEG pair.
pub const MAX_PAIR_DRIFT_SECS: i64 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairSummary {
    pub dry_run: bool,
    pub raw_files: usize,
    /// RAW files with a same-stem JPEG next to them.
    pub pairs_by_name: usize,
    pub pairs_verified: usize,
    /// Moved into `_extra_jpgs` (planned, in a dry run).
    pub jpegs_moved: usize,
    /// Same stem, but the camera model or capture time disagree.
    pub unverified: usize,
    /// Tag reads or moves that failed.
    pub errors: usize,
}

/// The first existing `<stem>.<ext>` next to `raw`, trying each extension lowercase and
/// then uppercase.
pub fn find_jpeg_partner(raw: &Path, extensions: &[&str]) -> Option<PathBuf> {
    extensions
        .iter()
        .flat_map(|ext| [ext.to_lowercase(), ext.to_uppercase()])
        .map(|ext| raw.with_extension(ext))
        .find(|candidate| candidate != raw && candidate.is_file())
}

/// Same camera model and capture times at most [`MAX_PAIR_DRIFT_SECS`] apart.
pub fn verify_pair(raw: &TagValues, jpeg: &TagValues) -> bool {
    let model_matches = match (raw.get(TAG_MODEL), jpeg.get(TAG_MODEL)) {
        (Some(a), Some(b)) => a.trim() == b.trim(),
        _ => false,
    };
    if !model_matches {
        return false;
    }

    let raw_time = raw.get(TAG_DATE_TIME_ORIGINAL).and_then(|v| parse_exif_datetime(v));
    let jpeg_time = jpeg.get(TAG_DATE_TIME_ORIGINAL).and_then(|v| parse_exif_datetime(v));
    match (raw_time, jpeg_time) {
        (Some(a), Some(b)) => (a - b).num_seconds().abs() <= MAX_PAIR_DRIFT_SECS,
        _ => false,
    }
}

/// Move the JPEG half of every verified RAW+JPEG pair into `_extra_jpgs`. RAW files are
/// never touched.
pub fn run_pair_jpegs(
    root: &Path,
    config: &AppConfig,
    dry_run: bool,
    oracle: &dyn MetadataOracle,
    reporter: &dyn ProgressReporter,
) -> Result<PairSummary, Error> {
    let root = super::resolve_root(root)?;
    let layout = Layout::new(&root, config);
    let raws: Vec<PathBuf> = super::classifier(&layout.special_dirs(), config)
        .collect_files(&root)?
        .files
        .into_iter()
        .filter(|f| config.file_formats.is_raw(f))
        .collect();
    info!("Found {} RAW files.", raws.len());

    let mut summary = PairSummary {
        dry_run,
        raw_files: raws.len(),
        ..Default::default()
    };
    let jpeg_extensions = config.file_formats.jpeg_extensions();
    let relocator = Relocator::new(dry_run);
    let extra_jpgs = layout.extra_jpgs();

    let start = Instant::now();
    reporter.on_step_start("Verifying RAW+JPEG pairs", raws.len());
    for (i, raw) in raws.iter().enumerate() {
        reporter.on_step_progress(i + 1, raws.len(), raw);
        let Some(jpeg) = find_jpeg_partner(raw, &jpeg_extensions) else {
            continue;
        };
        summary.pairs_by_name += 1;

        let pair = [raw.clone(), jpeg.clone()];
        let tags = match oracle.read_tags(&pair, &[TAG_MODEL, TAG_DATE_TIME_ORIGINAL]) {
            Ok(tags) => tags,
            Err(err) => {
                let err = super::escalate(err)?;
                warn!("Could not read tags of {}: {}", raw.display(), err);
                reporter.on_file_warning(raw, &err.to_string());
                summary.errors += 1;
                continue;
            }
        };

        let empty = TagValues::new();
        let raw_tags = tags.get(raw).unwrap_or(&empty);
        let jpeg_tags = tags.get(&jpeg).unwrap_or(&empty);
        if !verify_pair(raw_tags, jpeg_tags) {
            debug!(
                "Pair not verified: {} / {} ({:?} vs {:?})",
                raw.display(),
                jpeg.display(),
                raw_tags,
                jpeg_tags
            );
            summary.unverified += 1;
            continue;
        }
        summary.pairs_verified += 1;

        match relocator.relocate(&RelocationRequest::flat(&jpeg, &extra_jpgs)) {
            Ok(Relocation::Moved(_)) => summary.jpegs_moved += 1,
            Ok(Relocation::Planned(dest)) => {
                reporter.on_planned("move jpeg", &jpeg, Some(&dest));
                summary.jpegs_moved += 1;
            }
            Ok(Relocation::SourceMissing) => summary.errors += 1,
            Err(e) => {
                reporter.on_file_warning(&jpeg, &e.to_string());
                summary.errors += 1;
            }
        }
    }
    reporter.on_step_complete("Verifying RAW+JPEG pairs", start.elapsed().as_secs_f64());

    info!(
        "{} of {} name pairs verified, {} JPEGs moved to '{}'.",
        summary.pairs_verified,
        summary.pairs_by_name,
        summary.jpegs_moved,
        extra_jpgs.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn tags(model: &str, time: &str) -> TagValues {
        TagValues::from([
            (TAG_MODEL.to_string(), model.to_string()),
            (TAG_DATE_TIME_ORIGINAL.to_string(), time.to_string()),
        ])
    }

    #[test]
    fn test_verify_pair_allows_one_second_of_drift() {
        let raw = tags("NX300", "2023:07:14 18:02:11");
        assert!(verify_pair(&raw, &tags("NX300", "2023:07:14 18:02:12")));
        assert!(verify_pair(&raw, &tags("NX300", "2023:07:14 18:02:10")));
        assert!(!verify_pair(&raw, &tags("NX300", "2023:07:14 18:02:13")));
        assert!(!verify_pair(&raw, &tags("NX3000", "2023:07:14 18:02:11")));
        assert!(!verify_pair(&raw, &TagValues::new()));
    }

    #[test]
    fn test_find_jpeg_partner_stops_at_first_extension() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("IMG_1.srw");
        fs::write(&raw, b"raw").unwrap();
        assert_eq!(find_jpeg_partner(&raw, &["jpg", "jpeg"]), None);

        fs::write(dir.path().join("IMG_1.jpeg"), b"b").unwrap();
        fs::write(dir.path().join("IMG_1.JPG"), b"a").unwrap();
        let partner = find_jpeg_partner(&raw, &["jpg", "jpeg"]).unwrap();
        // Either spelling of the first extension wins over the second extension
        assert!(partner.extension().unwrap().eq_ignore_ascii_case("jpg"));
    }
}

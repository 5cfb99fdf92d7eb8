use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::Error;
use crate::layout::Layout;
use crate::oracle::{parse_exif_datetime, MetadataOracle, TAG_DATE_TIME_ORIGINAL};
use crate::progress::ProgressReporter;
use crate::relocate::{Relocation, RelocationRequest, Relocator};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByDateSummary {
    pub dry_run: bool,
    pub candidates: usize,
    /// Moved into `by-date/YYYY-MM-DD/` (planned, in a dry run).
    pub filed: usize,
    /// No usable capture time; left where they are.
    pub undated: usize,
    pub errors: usize,
}

/// `by-date/2023-07-14/2023-07-14--18-02-11.jpg` for a file shot at that time.
pub fn dated_destination(by_date: &Path, taken: &NaiveDateTime, source: &Path) -> (PathBuf, String) {
    let dir = by_date.join(taken.format("%Y-%m-%d").to_string());
    let mut name = taken.format("%Y-%m-%d--%H-%M-%S").to_string();
    if let Some(ext) = source.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy().to_lowercase());
    }
    (dir, name)
}

/// Top-level directories whose name starts with `_` belong to the tool or the user's own
/// holding areas and are never filed.
fn underscore_dirs(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|e| e.file_name().to_string_lossy().starts_with('_'))
        .map(|e| e.path())
        .collect()
}

/// File every dated file under `root` into `by-date/YYYY-MM-DD/`, renamed after its
/// capture time.
pub fn run_by_date(
    root: &Path,
    config: &AppConfig,
    dry_run: bool,
    oracle: &dyn MetadataOracle,
    reporter: &dyn ProgressReporter,
) -> Result<ByDateSummary, Error> {
    let root = super::resolve_root(root)?;
    let layout = Layout::new(&root, config);
    let by_date = layout.by_date();

    let mut excluded = layout.special_dirs();
    excluded.push(by_date.clone());
    excluded.extend(underscore_dirs(&root));
    let files = super::classifier(&excluded, config).collect_files(&root)?.files;
    info!("Found {} files to organize.", files.len());

    let mut summary = ByDateSummary {
        dry_run,
        candidates: files.len(),
        ..Default::default()
    };
    let relocator = Relocator::new(dry_run);

    let start = Instant::now();
    reporter.on_step_start("Organizing by date", files.len());
    let mut done = 0;
    for chunk in files.chunks(super::batch_size(config)) {
        let tags = match oracle.read_tags(chunk, &[TAG_DATE_TIME_ORIGINAL]) {
            Ok(tags) => tags,
            Err(err) => {
                let err = super::escalate(err)?;
                warn!("Could not read capture times of {} files: {}", chunk.len(), err);
                for file in chunk {
                    reporter.on_file_warning(file, &err.to_string());
                }
                summary.errors += chunk.len();
                done += chunk.len();
                continue;
            }
        };

        for file in chunk {
            done += 1;
            reporter.on_step_progress(done, files.len(), file);

            let taken = tags
                .get(file)
                .and_then(|t| t.get(TAG_DATE_TIME_ORIGINAL))
                .and_then(|v| parse_exif_datetime(v));
            let Some(taken) = taken else {
                summary.undated += 1;
                continue;
            };

            let (dir, name) = dated_destination(&by_date, &taken, file);
            match relocator.relocate(&RelocationRequest::flat(file, dir).with_name(name)) {
                Ok(Relocation::Moved(_)) => summary.filed += 1,
                Ok(Relocation::Planned(dest)) => {
                    reporter.on_planned("file by date", file, Some(&dest));
                    summary.filed += 1;
                }
                Ok(Relocation::SourceMissing) => summary.errors += 1,
                Err(e) => {
                    reporter.on_file_warning(file, &e.to_string());
                    summary.errors += 1;
                }
            }
        }
    }
    reporter.on_step_complete("Organizing by date", start.elapsed().as_secs_f64());

    if summary.undated > 0 {
        warn!(
            "{} files have no capture time and were left in place.",
            summary.undated
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_dated_destination_lowercases_extension() {
        let taken = NaiveDate::from_ymd_opt(2023, 7, 14)
            .unwrap()
            .and_hms_opt(18, 2, 11)
            .unwrap();
        let (dir, name) = dated_destination(Path::new("/p/by-date"), &taken, Path::new("/p/IMG_1.JPG"));
        assert_eq!(dir, PathBuf::from("/p/by-date/2023-07-14"));
        assert_eq!(name, "2023-07-14--18-02-11.jpg");

        let (_, bare) = dated_destination(Path::new("/p/by-date"), &taken, Path::new("/p/README"));
        assert_eq!(bare, "2023-07-14--18-02-11");
    }
}

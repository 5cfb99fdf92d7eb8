use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::Error;
use crate::layout::Layout;
use crate::oracle::{MetadataOracle, TimeShift};
use crate::progress::ProgressReporter;
use crate::relocate::{Relocation, RelocationRequest, Relocator};
use crate::scanner::PathClassifier;

/// Suffix exiftool appends to the backup it keeps of every file it rewrites.
pub const BACKUP_SUFFIX: &str = "_original";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeshiftSummary {
    pub dry_run: bool,
    pub candidates: usize,
    pub updated: usize,
    /// No date tags to shift; moved to the untagged-photos directory.
    pub no_tags: usize,
    /// The tool could not process the file (or it could not be moved aside afterwards).
    pub errors: usize,
    /// Dry run only: files that would have been handed to the tool.
    pub planned: usize,
    pub originals_moved: usize,
    pub original_errors: usize,
}

/// Shift every date tag of every file under `root` by `offset` (`+=Y:M:D H:M:S`).
///
/// Files the tool reports as unchanged go to `_untagged_photos`, files it fails on go to
/// `_non_photos`, and the tool's `*_original` backups are collected into `_originals`.
pub fn run_timeshift(
    root: &Path,
    config: &AppConfig,
    offset: &str,
    dry_run: bool,
    oracle: &dyn MetadataOracle,
    reporter: &dyn ProgressReporter,
) -> Result<TimeshiftSummary, Error> {
    let shift = TimeShift::parse(offset)?;
    let root = super::resolve_root(root)?;
    let layout = Layout::new(&root, config);
    let special = layout.special_dirs();

    let mut ignore = config.ignore_patterns.clone();
    for pattern in [format!("*{}", BACKUP_SUFFIX), "*.tmp".to_string()] {
        if !ignore.contains(&pattern) {
            ignore.push(pattern);
        }
    }
    let files = PathClassifier::new(&special)
        .with_ignore_patterns(&ignore)
        .collect_files(&root)?
        .files;
    info!("Found {} files to process.", files.len());

    let mut summary = TimeshiftSummary {
        dry_run,
        candidates: files.len(),
        ..Default::default()
    };
    let relocator = Relocator::new(dry_run);
    let untagged = layout.untagged_photos();
    let non_photos = layout.non_photos();

    let start = Instant::now();
    reporter.on_step_start("Shifting timestamps", files.len());
    for (i, file) in files.iter().enumerate() {
        reporter.on_step_progress(i + 1, files.len(), file);

        if dry_run {
            reporter.on_planned(
                &format!("shift dates {}", shift.instruction()),
                file,
                None,
            );
            summary.planned += 1;
            continue;
        }

        let target = match oracle.apply_time_shift(std::slice::from_ref(file), &shift) {
            Ok(count) if count > 0 => {
                summary.updated += 1;
                continue;
            }
            Ok(_) => &untagged,
            Err(err) => {
                let err = super::escalate(err)?;
                warn!("Error running the metadata tool for {}: {}", file.display(), err);
                reporter.on_file_warning(file, &err.to_string());
                &non_photos
            }
        };

        match relocator.relocate(&RelocationRequest::flat(file, target)) {
            Ok(Relocation::Moved(_)) if target == &untagged => summary.no_tags += 1,
            Ok(Relocation::Moved(_)) => summary.errors += 1,
            Ok(_) => summary.errors += 1,
            Err(e) => {
                reporter.on_file_warning(file, &e.to_string());
                summary.errors += 1;
            }
        }
    }
    reporter.on_step_complete("Shifting timestamps", start.elapsed().as_secs_f64());

    // Collect the tool's backups
    let backups = PathClassifier::new(&special)
        .collect_files(&root)?
        .files
        .into_iter()
        .filter(|f| {
            f.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(BACKUP_SUFFIX) && n.len() > BACKUP_SUFFIX.len())
        })
        .collect::<Vec<_>>();

    let originals = layout.originals();
    for backup in &backups {
        let name = backup
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(BACKUP_SUFFIX))
            .unwrap_or_default()
            .to_string();
        let request = RelocationRequest::flat(backup, &originals).with_name(name);
        match relocator.relocate(&request) {
            Ok(Relocation::Moved(dest)) | Ok(Relocation::Planned(dest)) => {
                if dry_run {
                    reporter.on_planned("move backup", backup, Some(&dest));
                }
                summary.originals_moved += 1;
            }
            Ok(Relocation::SourceMissing) => summary.original_errors += 1,
            Err(e) => {
                reporter.on_file_warning(backup, &e.to_string());
                summary.original_errors += 1;
            }
        }
    }
    info!(
        "Moved {} backup files to '{}'.",
        summary.originals_moved,
        originals.display()
    );

    Ok(summary)
}

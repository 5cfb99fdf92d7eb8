use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::reports::{
    self, DuplicateMove, CONFLICT_REPORT_NAME, DEDUP_SCRIPT_NAME, RELOCATION_MANIFEST_NAME,
};
use crate::analysis::{build_file_records, find_duplicates_and_conflicts, KeyMode};
use crate::config::AppConfig;
use crate::error::Error;
use crate::hasher::ChecksumAlgorithm;
use crate::layout::Layout;
use crate::progress::ProgressReporter;
use crate::relocate::{Relocation, RelocationRequest, Relocator};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSummary {
    pub dry_run: bool,
    pub files_scanned: usize,
    /// Files that could not be hashed and were left out of grouping.
    pub unreadable: usize,
    /// Directories or entries the walk could not read.
    pub skipped_entries: usize,
    pub duplicate_groups: usize,
    pub duplicates_found: usize,
    /// Moved into the duplicates directory (planned, in a dry run).
    pub duplicates_relocated: usize,
    pub relocation_errors: usize,
    pub conflicts_found: usize,
    pub script_path: Option<PathBuf>,
    pub conflict_report_path: Option<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

/// Find duplicates and naming conflicts under `root`, move every duplicate (all but the
/// keeper of each group) into the duplicates directory, and write the reports.
pub fn run_dedup(
    root: &Path,
    config: &AppConfig,
    dry_run: bool,
    reporter: &dyn ProgressReporter,
) -> Result<DedupSummary, Error> {
    let algorithm: ChecksumAlgorithm = config.dedup.checksum_algorithm.parse()?;
    let mode = if config.dedup.strict_identity {
        KeyMode::Strict
    } else {
        KeyMode::Content
    };

    let root = super::resolve_root(root)?;
    let layout = Layout::new(&root, config);
    info!("Workspace directory: {}", layout.workspace().display());
    info!("Using '{}' checksum algorithm.", algorithm);

    let mut summary = DedupSummary {
        dry_run,
        ..Default::default()
    };

    // Stage 1: scan and hash
    reporter.on_scan_start(&root);
    let scan_start = Instant::now();
    let scan = super::classifier(&layout.special_dirs(), config).collect_files(&root)?;
    reporter.on_scan_complete(scan.files.len(), scan_start.elapsed().as_secs_f64());
    summary.files_scanned = scan.files.len();
    summary.skipped_entries = scan.skipped.len();

    reporter.on_step_start("Hashing", scan.files.len());
    let hash_start = Instant::now();
    let (records, unreadable) = build_file_records(&scan.files, algorithm);
    for path in &unreadable {
        reporter.on_file_warning(path, "could not be read; left out of duplicate detection");
    }
    summary.unreadable = unreadable.len();
    reporter.on_step_complete("Hashing", hash_start.elapsed().as_secs_f64());
    debug!(
        "Hashed {} files in {:.2}s",
        records.len(),
        hash_start.elapsed().as_secs_f64()
    );

    // Stage 2: classify
    let analysis = find_duplicates_and_conflicts(&records, mode);
    summary.duplicate_groups = analysis.duplicate_groups().count();
    summary.duplicates_found = analysis.duplicate_count();
    summary.conflicts_found = analysis.conflicts.len();

    // Stage 3: relocate duplicates
    let relocator = Relocator::new(dry_run);
    let mut moves: Vec<DuplicateMove> = Vec::new();
    reporter.on_step_start("Relocating duplicates", summary.duplicates_found);
    let move_start = Instant::now();
    let mut done = 0;
    for group in analysis.duplicate_groups() {
        let keeper = group.keeper();
        for dup in group.duplicates() {
            done += 1;
            reporter.on_step_progress(done, summary.duplicates_found, &dup.path);
            let request =
                RelocationRequest::preserving(&dup.path, &root, layout.duplicates_trash());
            match relocator.relocate(&request) {
                Ok(Relocation::Moved(dest)) | Ok(Relocation::Planned(dest)) => {
                    if dry_run {
                        reporter.on_planned("move duplicate", &dup.path, Some(&dest));
                    }
                    summary.duplicates_relocated += 1;
                    moves.push(DuplicateMove {
                        keeper: keeper.path.clone(),
                        duplicate: dup.path.clone(),
                        destination: dest,
                        size: dup.size,
                        checksum: dup.checksum.clone(),
                        failure: None,
                    });
                }
                Ok(Relocation::SourceMissing) => {
                    warn!("Duplicate {} vanished before it could be moved", dup.path.display());
                    reporter.on_file_warning(&dup.path, "vanished before it could be moved");
                    summary.relocation_errors += 1;
                }
                Err(e) => {
                    reporter.on_file_warning(&dup.path, &e.to_string());
                    summary.relocation_errors += 1;
                    moves.push(DuplicateMove {
                        keeper: keeper.path.clone(),
                        duplicate: dup.path.clone(),
                        destination: e.destination.clone(),
                        size: dup.size,
                        checksum: dup.checksum.clone(),
                        failure: Some(e.error.to_string()),
                    });
                }
            }
        }
    }
    reporter.on_step_complete("Relocating duplicates", move_start.elapsed().as_secs_f64());

    // Stage 4: reports
    let script_path = layout.workspace().join(DEDUP_SCRIPT_NAME);
    let script = (!moves.is_empty()).then(|| reports::render_dedup_script(&moves, &layout));
    if reports::write_or_remove(&script_path, script.as_deref())? {
        reports::make_executable(&script_path)?;
        summary.script_path = Some(script_path);
    }

    let conflict_path = layout.workspace().join(CONFLICT_REPORT_NAME);
    let conflict_report = (!analysis.conflicts.is_empty())
        .then(|| reports::render_conflict_report(&analysis.conflicts, &layout));
    if reports::write_or_remove(&conflict_path, conflict_report.as_deref())? {
        summary.conflict_report_path = Some(conflict_path);
    }

    if !dry_run && !moves.is_empty() {
        let manifest_path = layout.workspace().join(RELOCATION_MANIFEST_NAME);
        reports::write_relocation_manifest(&manifest_path, &moves, &layout)?;
        summary.manifest_path = Some(manifest_path);
    }

    info!(
        "Found {} duplicate files in {} groups, {} conflicting names",
        summary.duplicates_found, summary.duplicate_groups, summary.conflicts_found
    );
    Ok(summary)
}

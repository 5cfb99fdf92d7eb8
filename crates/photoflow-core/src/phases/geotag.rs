//! Two-pass geotagging.
//!
//! Every file is a [`GeotagToken`] moving through [`GeotagState`]s. Pass 1 interpolates
//! between bracketing track points; files it leaves untagged are parked in the holding
//! area and retried in pass 2 with extrapolation inside a bounded window. Files pass 2
//! tags go back to where they came from, the rest go to the untaggable area. Each pass
//! only ever submits the tokens still pending for it.
//!
//! Nothing is left in the holding area: if the tool goes away mid-run, held files are
//! moved back before the error is returned, and each run first reclaims whatever an
//! earlier, killed run left there.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::error::Error;
use crate::layout::Layout;
use crate::oracle::{GeotagMode, GeotagRequest, MetadataOracle, Timezone, TAG_GPS_LATITUDE};
use crate::progress::{ProgressReporter, SilentReporter};
use crate::relocate::{Relocation, RelocationRequest, Relocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeotagState {
    AlreadyTagged,
    PendingPass1,
    PendingPass2,
    TaggedPass1,
    TaggedPass2,
    Untaggable,
}

impl GeotagState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, GeotagState::PendingPass1 | GeotagState::PendingPass2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeotagToken {
    /// Where the file was when the pipeline started.
    pub original: PathBuf,
    /// Where the file is now.
    pub current: PathBuf,
    pub state: GeotagState,
    /// The file sits in the holding area.
    pub held: bool,
}

impl GeotagToken {
    fn new(path: PathBuf) -> Self {
        Self {
            current: path.clone(),
            original: path,
            state: GeotagState::PendingPass1,
            held: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeotagSummary {
    pub dry_run: bool,
    pub files: usize,
    pub already_tagged: usize,
    pub tagged_pass1: usize,
    pub tagged_pass2: usize,
    pub untaggable: usize,
    /// Dry run only: files that would have been submitted to pass 1.
    pub planned: usize,
    /// Moves between areas that failed. The file keeps its outcome; it just stayed put.
    pub relocation_errors: usize,
    /// Files an earlier, interrupted run left in the holding area and that were moved
    /// back before scanning.
    pub reclaimed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GeotagReport {
    pub summary: GeotagSummary,
    /// Final token of every input file, in input order.
    pub outcomes: Vec<GeotagToken>,
}

/// Where files live during the pipeline.
#[derive(Debug, Clone)]
pub struct GeotagAreas {
    /// Tree being tagged; holding and untaggable paths mirror positions below it.
    pub base_dir: PathBuf,
    pub holding_dir: PathBuf,
    pub untaggable_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct GeotagOptions {
    pub gpx_dir: PathBuf,
    pub timezone: String,
    pub dry_run: bool,
}

pub struct GeotagPipeline<'a> {
    oracle: &'a dyn MetadataOracle,
    reporter: &'a dyn ProgressReporter,
    gpx_pattern: String,
    timezone: Timezone,
    window_secs: u64,
    areas: GeotagAreas,
    batch_size: usize,
    dry_run: bool,
}

impl<'a> GeotagPipeline<'a> {
    pub fn new(
        oracle: &'a dyn MetadataOracle,
        gpx_pattern: impl Into<String>,
        timezone: Timezone,
        window_secs: u64,
        areas: GeotagAreas,
    ) -> Self {
        Self {
            oracle,
            reporter: &SilentReporter,
            gpx_pattern: gpx_pattern.into(),
            timezone,
            window_secs,
            areas,
            batch_size: 200,
            dry_run: false,
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn request(&self, mode: GeotagMode) -> GeotagRequest {
        GeotagRequest {
            gpx_pattern: self.gpx_pattern.clone(),
            timezone: self.timezone.clone(),
            mode,
        }
    }

    pub fn run(&self, files: Vec<PathBuf>) -> Result<GeotagReport, Error> {
        let mut tokens: Vec<GeotagToken> = files.into_iter().map(GeotagToken::new).collect();
        let mut summary = GeotagSummary {
            dry_run: self.dry_run,
            files: tokens.len(),
            ..Default::default()
        };

        self.mark_already_tagged(&mut tokens)?;

        if self.dry_run {
            for token in tokens.iter().filter(|t| t.state == GeotagState::PendingPass1) {
                self.reporter.on_planned("geotag", &token.current, None);
                summary.planned += 1;
            }
            summary.already_tagged = count(&tokens, GeotagState::AlreadyTagged);
            return Ok(GeotagReport {
                summary,
                outcomes: tokens,
            });
        }

        let relocator = Relocator::new(false);
        if let Err(err) = self.tag_passes(&mut tokens, &relocator, &mut summary) {
            let released = self.release_held(&mut tokens, &relocator, &mut summary);
            remove_empty_dirs(&self.areas.holding_dir);
            warn!(
                "Geotagging aborted, {} held files moved back to '{}': {}",
                released,
                self.areas.base_dir.display(),
                err
            );
            return Err(err);
        }
        remove_empty_dirs(&self.areas.holding_dir);

        debug_assert!(tokens.iter().all(|t| t.state.is_terminal()));
        summary.already_tagged = count(&tokens, GeotagState::AlreadyTagged);
        summary.tagged_pass1 = count(&tokens, GeotagState::TaggedPass1);
        summary.tagged_pass2 = count(&tokens, GeotagState::TaggedPass2);
        summary.untaggable = count(&tokens, GeotagState::Untaggable);

        info!(
            "Geotagging complete: {} already tagged, {} tagged by interpolation, {} by extrapolation, {} untaggable",
            summary.already_tagged, summary.tagged_pass1, summary.tagged_pass2, summary.untaggable
        );
        Ok(GeotagReport {
            summary,
            outcomes: tokens,
        })
    }

    /// Start: files that already carry GPS leave the pipeline untouched. A failed query
    /// leaves its files pending so they are still attempted.
    fn mark_already_tagged(&self, tokens: &mut [GeotagToken]) -> Result<(), Error> {
        let total = tokens.len();
        self.reporter.on_step_start("Checking existing GPS tags", total);
        let start = Instant::now();
        let mut done = 0;
        for chunk in tokens.chunks_mut(self.batch_size) {
            let files: Vec<PathBuf> = chunk.iter().map(|t| t.current.clone()).collect();
            match self.oracle.files_with_tag(&files, TAG_GPS_LATITUDE) {
                Ok(tagged) => {
                    for token in chunk.iter_mut().filter(|t| tagged.contains(&t.current)) {
                        token.state = GeotagState::AlreadyTagged;
                    }
                }
                Err(err) => {
                    let err = super::escalate(err)?;
                    warn!("GPS query for {} files failed: {}", files.len(), err);
                }
            }
            done += chunk.len();
            if let Some(last) = files.last() {
                self.reporter.on_step_progress(done, total, last);
            }
        }
        self.reporter
            .on_step_complete("Checking existing GPS tags", start.elapsed().as_secs_f64());
        Ok(())
    }

    fn tag_passes(
        &self,
        tokens: &mut [GeotagToken],
        relocator: &Relocator,
        summary: &mut GeotagSummary,
    ) -> Result<(), Error> {
        self.first_pass(tokens, relocator, summary)?;
        self.second_pass(tokens, relocator, summary)
    }

    /// Abort path: every file still in the holding area goes back under the base
    /// directory.
    fn release_held(
        &self,
        tokens: &mut [GeotagToken],
        relocator: &Relocator,
        summary: &mut GeotagSummary,
    ) -> usize {
        let mut released = 0;
        for token in tokens.iter_mut().filter(|t| t.held) {
            let back = RelocationRequest::preserving(
                &token.current,
                &self.areas.holding_dir,
                &self.areas.base_dir,
            );
            if let Some(dest) = self.shift(relocator, &back, summary) {
                token.current = dest;
                token.held = false;
                released += 1;
            }
        }
        released
    }

    /// PendingPass1 -> TaggedPass1, or into the holding area as PendingPass2.
    fn first_pass(
        &self,
        tokens: &mut [GeotagToken],
        relocator: &Relocator,
        summary: &mut GeotagSummary,
    ) -> Result<(), Error> {
        let pending = indices_in(tokens, GeotagState::PendingPass1);
        let request = self.request(GeotagMode::Interpolate);
        self.reporter
            .on_step_start("Geotagging, pass 1 (interpolation)", pending.len());
        let start = Instant::now();

        let mut done = 0;
        for chunk in pending.chunks(self.batch_size) {
            let files: Vec<PathBuf> = chunk.iter().map(|&i| tokens[i].current.clone()).collect();
            let tagged = self.tag_batch(&files, &request)?;

            for &i in chunk {
                let token = &mut tokens[i];
                done += 1;
                self.reporter.on_step_progress(done, pending.len(), &token.current);
                if tagged.contains(&token.current) {
                    token.state = GeotagState::TaggedPass1;
                    continue;
                }

                token.state = GeotagState::PendingPass2;
                let hold = RelocationRequest::preserving(
                    &token.current,
                    &self.areas.base_dir,
                    &self.areas.holding_dir,
                );
                if let Some(dest) = self.shift(relocator, &hold, summary) {
                    token.current = dest;
                    token.held = true;
                }
            }
        }
        self.reporter.on_step_complete(
            "Geotagging, pass 1 (interpolation)",
            start.elapsed().as_secs_f64(),
        );
        Ok(())
    }

    /// PendingPass2 -> TaggedPass2 (restored to its original place) or Untaggable.
    fn second_pass(
        &self,
        tokens: &mut [GeotagToken],
        relocator: &Relocator,
        summary: &mut GeotagSummary,
    ) -> Result<(), Error> {
        let pending = indices_in(tokens, GeotagState::PendingPass2);
        let request = self.request(GeotagMode::Extrapolate {
            window_secs: self.window_secs,
        });
        self.reporter
            .on_step_start("Geotagging, pass 2 (extrapolation)", pending.len());
        let start = Instant::now();

        let mut done = 0;
        for chunk in pending.chunks(self.batch_size) {
            let files: Vec<PathBuf> = chunk.iter().map(|&i| tokens[i].current.clone()).collect();
            let tagged = self.tag_batch(&files, &request)?;

            for &i in chunk {
                let token = &mut tokens[i];
                done += 1;
                self.reporter.on_step_progress(done, pending.len(), &token.current);
                let from = if token.held {
                    &self.areas.holding_dir
                } else {
                    &self.areas.base_dir
                };

                let target = if tagged.contains(&token.current) {
                    token.state = GeotagState::TaggedPass2;
                    if !token.held {
                        continue;
                    }
                    &self.areas.base_dir
                } else {
                    token.state = GeotagState::Untaggable;
                    &self.areas.untaggable_dir
                };

                let mv = RelocationRequest::preserving(&token.current, from, target);
                if let Some(dest) = self.shift(relocator, &mv, summary) {
                    token.current = dest;
                    token.held = false;
                }
            }
        }
        self.reporter.on_step_complete(
            "Geotagging, pass 2 (extrapolation)",
            start.elapsed().as_secs_f64(),
        );
        Ok(())
    }

    /// Write, then ask which files actually carry GPS now. A failed write or re-query
    /// counts as "nothing tagged" for the whole batch.
    fn tag_batch(
        &self,
        files: &[PathBuf],
        request: &GeotagRequest,
    ) -> Result<BTreeSet<PathBuf>, Error> {
        let outcome = self.oracle.apply_geotag(files, request).and_then(|updated| {
            debug!("Geotag call reported {} of {} files updated", updated, files.len());
            self.oracle.files_with_tag(files, TAG_GPS_LATITUDE)
        });

        match outcome {
            Ok(tagged) => Ok(tagged),
            Err(err) => {
                let err = super::escalate(err)?;
                warn!(
                    "Geotag batch of {} files failed, none of them count as tagged: {}",
                    files.len(),
                    err
                );
                for file in files {
                    self.reporter.on_file_warning(file, &err.to_string());
                }
                Ok(BTreeSet::new())
            }
        }
    }

    fn shift(
        &self,
        relocator: &Relocator,
        request: &RelocationRequest,
        summary: &mut GeotagSummary,
    ) -> Option<PathBuf> {
        match relocator.relocate(request) {
            Ok(Relocation::Moved(dest)) | Ok(Relocation::Planned(dest)) => Some(dest),
            Ok(Relocation::SourceMissing) => {
                self.reporter
                    .on_file_warning(&request.source, "vanished during geotagging");
                summary.relocation_errors += 1;
                None
            }
            Err(e) => {
                self.reporter.on_file_warning(&request.source, &e.to_string());
                summary.relocation_errors += 1;
                None
            }
        }
    }
}

fn indices_in(tokens: &[GeotagToken], state: GeotagState) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.state == state)
        .map(|(i, _)| i)
        .collect()
}

fn count(tokens: &[GeotagToken], state: GeotagState) -> usize {
    tokens.iter().filter(|t| t.state == state).count()
}

/// Drop the directory skeleton left behind in `dir` once files have been moved out.
fn remove_empty_dirs(dir: &Path) {
    if !dir.is_dir() {
        return;
    }
    for entry in WalkDir::new(dir)
        .contents_first(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
    {
        // Fails on non-empty directories, which is what we want
        let _ = fs::remove_dir(entry.path());
    }
}

/// Move files an interrupted run left in `holding` back to their place under `base_dir`.
fn reclaim_held(
    holding: &Path,
    base_dir: &Path,
    dry_run: bool,
    reporter: &dyn ProgressReporter,
) -> usize {
    if !holding.is_dir() {
        return 0;
    }
    let leftovers: Vec<PathBuf> = WalkDir::new(holding)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    let relocator = Relocator::new(dry_run);
    let mut reclaimed = 0;
    for file in &leftovers {
        match relocator.relocate(&RelocationRequest::preserving(file, holding, base_dir)) {
            Ok(Relocation::Moved(_)) => reclaimed += 1,
            Ok(Relocation::Planned(dest)) => {
                reporter.on_planned("reclaim held file", file, Some(&dest));
                reclaimed += 1;
            }
            Ok(Relocation::SourceMissing) => {}
            Err(e) => reporter.on_file_warning(file, &e.to_string()),
        }
    }
    if !dry_run {
        remove_empty_dirs(holding);
    }
    if reclaimed > 0 {
        warn!(
            "{} files left in '{}' by an earlier run were moved back to '{}'.",
            reclaimed,
            holding.display(),
            base_dir.display()
        );
    }
    reclaimed
}

/// Geotag every file under `by-date` from the GPX tracks in `options.gpx_dir`.
pub fn run_geotag(
    root: &Path,
    config: &AppConfig,
    options: &GeotagOptions,
    oracle: &dyn MetadataOracle,
    reporter: &dyn ProgressReporter,
) -> Result<GeotagReport, Error> {
    let timezone = Timezone::parse(&options.timezone)?;
    if !options.gpx_dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "GPX directory not found at '{}'",
            options.gpx_dir.display()
        )));
    }
    let gpx_dir = fs::canonicalize(&options.gpx_dir)?;
    let escaped = glob::Pattern::escape(&gpx_dir.to_string_lossy());
    let has_tracks = glob::glob(&format!("{}/*.gpx", escaped))
        .map(|mut paths| paths.any(|p| p.is_ok()))
        .unwrap_or(false);
    if !has_tracks {
        return Err(Error::InvalidInput(format!(
            "No .gpx files found in '{}'",
            gpx_dir.display()
        )));
    }

    let root = super::resolve_root(root)?;
    let layout = Layout::new(&root, config);
    let by_date = layout.by_date();
    if !by_date.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Target directory '{}' not found. Please run 'by-date' first.",
            by_date.display()
        )));
    }

    let holding_dir = layout.geotag_pending();
    let reclaimed = reclaim_held(&holding_dir, &by_date, options.dry_run, reporter);

    let files = super::classifier(&layout.special_dirs(), config)
        .collect_files(&by_date)?
        .files;
    info!("Found {} files to geotag in '{}'.", files.len(), by_date.display());

    let areas = GeotagAreas {
        base_dir: by_date,
        holding_dir,
        untaggable_dir: layout.geotag_untaggable(),
    };
    let gpx_pattern = gpx_dir.join("*.gpx").to_string_lossy().into_owned();
    let mut report = GeotagPipeline::new(
        oracle,
        gpx_pattern,
        timezone,
        config.geotag.extrapolation_window_secs,
        areas,
    )
    .with_reporter(reporter)
    .with_batch_size(super::batch_size(config))
    .dry_run(options.dry_run)
    .run(files)?;
    report.summary.reclaimed = reclaimed;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_final_states_are_terminal() {
        use GeotagState::*;
        for state in [AlreadyTagged, TaggedPass1, TaggedPass2, Untaggable] {
            assert!(state.is_terminal());
        }
        assert!(!PendingPass1.is_terminal());
        assert!(!PendingPass2.is_terminal());
    }
}

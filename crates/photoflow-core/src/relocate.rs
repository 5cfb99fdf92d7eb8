//! Collision-safe file relocation shared by every phase.
//!
//! Counter rule: only the final dotted suffix is the extension. `photo.jpg` collides to
//! `photo-01.jpg`, `archive.tar.gz` to `archive.tar-01.gz`, and a dotfile such as
//! `.hidden` has no extension and becomes `.hidden-01`.

use dashmap::DashMap;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::scanner::resolve_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationMode {
    /// `target_dir/name`, adding a `-NN` counter until the name is free.
    Flat,
    /// `target_dir/<source relative to base_dir>`, creating intermediate directories.
    /// Existing files at the destination are not protected.
    StructurePreserving { base_dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationRequest {
    pub source: PathBuf,
    pub target_dir: PathBuf,
    pub mode: RelocationMode,
    /// Replaces the source file name (Flat mode only).
    pub desired_name: Option<String>,
}

impl RelocationRequest {
    pub fn flat(source: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target_dir: target_dir.into(),
            mode: RelocationMode::Flat,
            desired_name: None,
        }
    }

    /// Mirror `source`'s position under `base_dir` into `new_root`.
    pub fn preserving(
        source: impl Into<PathBuf>,
        base_dir: impl Into<PathBuf>,
        new_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            target_dir: new_root.into(),
            mode: RelocationMode::StructurePreserving {
                base_dir: base_dir.into(),
            },
            desired_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.desired_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    Moved(PathBuf),
    /// Dry run: the destination the move would have used.
    Planned(PathBuf),
    /// The source no longer exists; nothing was done.
    SourceMissing,
}

impl Relocation {
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Relocation::Moved(dest) | Relocation::Planned(dest) => Some(dest),
            Relocation::SourceMissing => None,
        }
    }
}

#[derive(Error, Debug)]
#[error("Error moving {} to {}: {error}", .source_path.display(), .destination.display())]
pub struct RelocateError {
    pub source_path: PathBuf,
    pub destination: PathBuf,
    #[source]
    pub error: io::Error,
}

/// Moves files with a single rename call each. Flat-mode moves into the same directory are
/// serialized so two moves can never claim the same counter suffix.
#[derive(Debug, Default)]
pub struct Relocator {
    dry_run: bool,
    dir_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    /// Destinations handed out during a dry run, so a simulated batch numbers its
    /// collisions the way the real batch would.
    planned: Mutex<HashSet<PathBuf>>,
}

impl Relocator {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Move (or, in dry-run mode, plan) one file.
    pub fn relocate(&self, request: &RelocationRequest) -> Result<Relocation, RelocateError> {
        if fs::symlink_metadata(&request.source).is_err() {
            debug!("Source {} no longer exists", request.source.display());
            return Ok(Relocation::SourceMissing);
        }

        match &request.mode {
            RelocationMode::Flat => self.relocate_flat(request),
            RelocationMode::StructurePreserving { base_dir } => {
                self.relocate_preserving(request, base_dir)
            }
        }
    }

    fn relocate_flat(&self, request: &RelocationRequest) -> Result<Relocation, RelocateError> {
        let lock = self
            .dir_locks
            .entry(request.target_dir.clone())
            .or_default()
            .clone();
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let base_name = match &request.desired_name {
            Some(name) => name.clone(),
            None => request
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        let mut planned = self.planned.lock().unwrap_or_else(|e| e.into_inner());
        let destination = free_destination(&request.target_dir, &base_name, |candidate| {
            fs::symlink_metadata(candidate).is_ok() || planned.contains(candidate)
        });

        if self.dry_run {
            planned.insert(destination.clone());
            return Ok(Relocation::Planned(destination));
        }
        drop(planned);

        self.move_file(&request.source, &destination)
    }

    fn relocate_preserving(
        &self,
        request: &RelocationRequest,
        base_dir: &Path,
    ) -> Result<Relocation, RelocateError> {
        let relative = relative_to(&request.source, base_dir).ok_or_else(|| RelocateError {
            source_path: request.source.clone(),
            destination: request.target_dir.clone(),
            error: io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("source is not under {}", base_dir.display()),
            ),
        })?;
        let destination = request.target_dir.join(relative);

        if self.dry_run {
            return Ok(Relocation::Planned(destination));
        }
        self.move_file(&request.source, &destination)
    }

    fn move_file(&self, source: &Path, destination: &Path) -> Result<Relocation, RelocateError> {
        let fail = |error: io::Error| {
            error!(
                "Error moving file {} to {}: {}",
                source.display(),
                destination.display(),
                error
            );
            RelocateError {
                source_path: source.to_path_buf(),
                destination: destination.to_path_buf(),
                error,
            }
        };

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        fs::rename(source, destination).map_err(fail)?;
        trace!("Moved {} -> {}", source.display(), destination.display());
        Ok(Relocation::Moved(destination.to_path_buf()))
    }
}

/// First free `target_dir/name`, then `stem-01.ext`, `stem-02.ext`, ...
fn free_destination(
    target_dir: &Path,
    base_name: &str,
    mut taken: impl FnMut(&Path) -> bool,
) -> PathBuf {
    let mut destination = target_dir.join(base_name);
    if !taken(&destination) {
        return destination;
    }

    let (stem, extension) = split_name(base_name);
    let mut counter = 0u32;
    while taken(&destination) {
        counter += 1;
        let candidate = match extension {
            Some(ext) => format!("{}-{:02}.{}", stem, counter, ext),
            None => format!("{}-{:02}", stem, counter),
        };
        destination = target_dir.join(candidate);
    }
    destination
}

/// Split on the final dot only; a leading dot does not start an extension.
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

fn relative_to(source: &Path, base_dir: &Path) -> Option<PathBuf> {
    if let Ok(rel) = source.strip_prefix(base_dir) {
        return Some(rel.to_path_buf());
    }
    let source = resolve_path(source);
    let base_dir = resolve_path(base_dir);
    source.strip_prefix(&base_dir).ok().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_split_name_uses_final_suffix() {
        assert_eq!(split_name("photo.jpg"), ("photo", Some("jpg")));
        assert_eq!(split_name("backup.tar.gz"), ("backup.tar", Some("gz")));
        assert_eq!(split_name(".hidden"), (".hidden", None));
        assert_eq!(split_name("README"), ("README", None));
        assert_eq!(split_name("trailing."), ("trailing.", None));
    }

    #[test]
    fn test_flat_collisions_get_counters() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("target");
        let relocator = Relocator::new(false);

        let mut destinations = Vec::new();
        for dir in ["a", "b", "c"] {
            let source = tmp.path().join(dir).join("photo.jpg");
            write(&source, dir);
            let result = relocator
                .relocate(&RelocationRequest::flat(&source, &target))
                .unwrap();
            destinations.push(result.destination().unwrap().to_path_buf());
        }

        assert_eq!(
            destinations,
            vec![
                target.join("photo.jpg"),
                target.join("photo-01.jpg"),
                target.join("photo-02.jpg"),
            ]
        );
        assert_eq!(fs::read_to_string(target.join("photo-02.jpg")).unwrap(), "c");
    }

    #[test]
    fn test_flat_multi_part_extension_and_desired_name() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("target");
        write(&target.join("backup.tar.gz"), "existing");
        let source = tmp.path().join("src/whatever.bin");
        write(&source, "new");

        let relocator = Relocator::new(false);
        let result = relocator
            .relocate(&RelocationRequest::flat(&source, &target).with_name("backup.tar.gz"))
            .unwrap();
        assert_eq!(result, Relocation::Moved(target.join("backup.tar-01.gz")));
    }

    #[test]
    fn test_structure_preserving_round_trip() {
        let tmp = tempdir().unwrap();
        let base = tmp.path().join("a");
        let hold = tmp.path().join("H");
        let original = base.join("b").join("c.jpg");
        write(&original, "data");

        let relocator = Relocator::new(false);
        let held = relocator
            .relocate(&RelocationRequest::preserving(&original, &base, &hold))
            .unwrap();
        assert_eq!(held, Relocation::Moved(hold.join("b").join("c.jpg")));
        assert!(!original.exists());

        let back = relocator
            .relocate(&RelocationRequest::preserving(
                hold.join("b").join("c.jpg"),
                &hold,
                &base,
            ))
            .unwrap();
        assert_eq!(back, Relocation::Moved(original.clone()));
        assert_eq!(fs::read_to_string(&original).unwrap(), "data");
    }

    #[test]
    fn test_structure_preserving_rejects_source_outside_base() {
        let tmp = tempdir().unwrap();
        let source = tmp.path().join("elsewhere/x.jpg");
        write(&source, "x");
        let err = Relocator::new(false)
            .relocate(&RelocationRequest::preserving(
                &source,
                tmp.path().join("base"),
                tmp.path().join("H"),
            ))
            .unwrap_err();
        assert_eq!(err.error.kind(), io::ErrorKind::InvalidInput);
        assert!(source.exists());
    }

    #[test]
    fn test_missing_source_is_a_no_op() {
        let tmp = tempdir().unwrap();
        let result = Relocator::new(false)
            .relocate(&RelocationRequest::flat(
                tmp.path().join("gone.jpg"),
                tmp.path().join("t"),
            ))
            .unwrap();
        assert_eq!(result, Relocation::SourceMissing);
        assert!(!tmp.path().join("t").exists());
    }

    #[test]
    fn test_dry_run_matches_real_destinations() {
        let build = |root: &Path| {
            write(&root.join("target/photo.jpg"), "existing");
            for dir in ["a", "b"] {
                write(&root.join(dir).join("photo.jpg"), dir);
            }
            write(&root.join("nested/x/y.jpg"), "y");
        };
        let requests = |root: &Path| {
            vec![
                RelocationRequest::flat(root.join("a/photo.jpg"), root.join("target")),
                RelocationRequest::flat(root.join("b/photo.jpg"), root.join("target")),
                RelocationRequest::preserving(
                    root.join("nested/x/y.jpg"),
                    root.join("nested"),
                    root.join("hold"),
                ),
            ]
        };

        let tmp = tempdir().unwrap();
        let root = tmp.path();
        build(root);

        let dry = Relocator::new(true);
        let planned: Vec<_> = requests(root)
            .iter()
            .map(|r| dry.relocate(r).unwrap().destination().unwrap().to_path_buf())
            .collect();
        assert!(root.join("a/photo.jpg").exists());
        assert!(!root.join("hold").exists());

        let real = Relocator::new(false);
        let moved: Vec<_> = requests(root)
            .iter()
            .map(|r| real.relocate(r).unwrap().destination().unwrap().to_path_buf())
            .collect();

        assert_eq!(planned, moved);
        assert_eq!(moved[1], root.join("target/photo-02.jpg"));
    }

    #[test]
    fn test_parallel_flat_moves_never_share_a_name() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("target");
        let sources: Vec<PathBuf> = (0..16)
            .map(|i| {
                let path = tmp.path().join(format!("src{}", i)).join("same.jpg");
                write(&path, &i.to_string());
                path
            })
            .collect();

        let relocator = Relocator::new(false);
        let mut destinations: Vec<PathBuf> = sources
            .par_iter()
            .map(|s| {
                relocator
                    .relocate(&RelocationRequest::flat(s, &target))
                    .unwrap()
                    .destination()
                    .unwrap()
                    .to_path_buf()
            })
            .collect();
        destinations.sort();
        destinations.dedup();
        assert_eq!(destinations.len(), 16);
        assert_eq!(fs::read_dir(&target).unwrap().count(), 16);
    }
}

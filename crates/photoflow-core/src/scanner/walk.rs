use glob::Pattern;
use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// Files found under a scan root, plus the entries that could not be read.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Produces the candidate file list for a phase: every regular file under a root whose
/// resolved path does not lie inside one of the excluded subtrees.
///
/// Exclusion is a containment test over resolved path components, so `by-date` never
/// matches `by-date-old`.
#[derive(Debug, Clone, Default)]
pub struct PathClassifier {
    excluded: Vec<PathBuf>,
    ignore_patterns: Vec<Pattern>,
}

impl PathClassifier {
    pub fn new<P: AsRef<Path>>(excluded: &[P]) -> Self {
        let resolved = excluded
            .iter()
            .map(|p| resolve_path(p.as_ref()))
            .collect::<Vec<_>>();
        Self {
            excluded: non_overlapping_directories(resolved),
            ignore_patterns: Vec::new(),
        }
    }

    /// File-name globs (e.g. `*_original`) whose matches are left out of the scan.
    pub fn with_ignore_patterns(mut self, globs: &[String]) -> Self {
        self.ignore_patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        self
    }

    /// True when `path` (resolved first) is an excluded root or lies beneath one.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let resolved = resolve_path(path);
        self.is_excluded_resolved(&resolved)
    }

    fn is_excluded_resolved(&self, resolved: &Path) -> bool {
        self.excluded.iter().any(|ex| resolved.starts_with(ex))
    }

    fn is_ignored(&self, path: &Path) -> bool {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => self.ignore_patterns.iter().any(|p| p.matches(name)),
            None => false,
        }
    }

    /// Walk `root` and return every regular file not excluded or ignored, sorted by path.
    /// Unreadable directories are skipped with a warning and reported in `skipped`.
    pub fn collect_files(&self, root: &Path) -> io::Result<ScanOutcome> {
        let root = fs::canonicalize(root).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Error resolving scan root {}: {}", root.display(), e),
            )
        })?;

        let mut outcome = ScanOutcome::default();
        if self.is_excluded_resolved(&root) {
            debug!("Scan root {} is itself excluded", root.display());
            return Ok(outcome);
        }

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded_resolved(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!("Skipping unreadable entry {}: {}", path.display(), err);
                    outcome.skipped.push(path);
                    continue;
                }
            };

            if entry.file_type().is_file() && !self.is_ignored(entry.path()) {
                outcome.files.push(entry.into_path());
            }
        }

        outcome.files.sort();
        debug!(
            "Collected {} files under {} ({} skipped)",
            outcome.files.len(),
            root.display(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}

/// Resolve a path for containment tests. Existing paths are canonicalized; for a path
/// that does not exist yet the nearest existing ancestor is canonicalized and the
/// remaining components are appended after lexical normalization.
pub fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let normalized = normalize_lexically(&absolute);

    let mut existing = normalized.as_path();
    let mut tail: Vec<&std::ffi::OsStr> = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            tail.push(name);
        }
        existing = parent;
        if let Ok(canonical) = fs::canonicalize(existing) {
            let mut resolved = canonical;
            for name in tail.iter().rev() {
                resolved.push(name);
            }
            return resolved;
        }
    }
    normalized
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        if result.iter().any(|res_dir| dir.starts_with(res_dir)) {
            continue;
        }
        result.retain(|res_dir| !res_dir.starts_with(&dir));
        result.push(dir);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        let root = fs::canonicalize(root).unwrap();
        files
            .iter()
            .map(|f| {
                f.strip_prefix(&root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_non_overlapping_with_subdirectory() {
        let dirs = vec![
            PathBuf::from("/home/user/docs"),
            PathBuf::from("/home/user"),
            PathBuf::from("/var/data"),
            PathBuf::from("/var/data/nested"),
        ];
        let result = non_overlapping_directories(dirs);
        assert_eq!(
            result,
            vec![PathBuf::from("/home/user"), PathBuf::from("/var/data")]
        );
    }

    #[test]
    fn test_excludes_nested_subtree_but_not_prefix_sibling() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("by-date/2023-01-01/a.jpg"));
        touch(&root.join("by-date-old/b.jpg"));
        touch(&root.join("keep/c.jpg"));

        let classifier = PathClassifier::new(&[root.join("by-date")]);
        let outcome = classifier.collect_files(root).unwrap();

        assert_eq!(
            names(root, &outcome.files),
            vec!["by-date-old/b.jpg", "keep/c.jpg"]
        );
    }

    #[test]
    fn test_unresolved_exclusion_paths_are_resolved() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("ws/report.txt"));
        touch(&root.join("photos/a.jpg"));

        let dotted = root.join("photos").join("..").join("ws");
        let classifier = PathClassifier::new(&[dotted]);
        let outcome = classifier.collect_files(root).unwrap();

        assert_eq!(names(root, &outcome.files), vec!["photos/a.jpg"]);
        assert!(classifier.is_excluded(&root.join("ws/report.txt")));
        assert!(!classifier.is_excluded(&root.join("photos/a.jpg")));
    }

    #[test]
    fn test_missing_exclusion_still_excludes_when_created_later() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        let classifier = PathClassifier::new(&[root.join("_later")]);
        touch(&root.join("_later/x.jpg"));
        touch(&root.join("y.jpg"));

        let outcome = classifier.collect_files(root).unwrap();
        assert_eq!(names(root, &outcome.files), vec!["y.jpg"]);
    }

    #[test]
    fn test_ignore_patterns_match_file_names() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("a.jpg"));
        touch(&root.join("a.jpg_original"));
        touch(&root.join("sub/b.tmp"));

        let classifier = PathClassifier::new::<PathBuf>(&[])
            .with_ignore_patterns(&["*_original".to_string(), "*.tmp".to_string()]);
        let outcome = classifier.collect_files(root).unwrap();
        assert_eq!(names(root, &outcome.files), vec!["a.jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().unwrap();
        let root = tmp.path();
        touch(&root.join("locked/a.jpg"));
        touch(&root.join("open/b.jpg"));
        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permission bits are not enforced for this user
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let outcome = PathClassifier::default().collect_files(root);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let outcome = outcome.unwrap();

        assert_eq!(names(root, &outcome.files), vec!["open/b.jpg"]);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.skipped[0].ends_with("locked"));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = tempdir().unwrap();
        let classifier = PathClassifier::default();
        assert!(classifier.collect_files(&tmp.path().join("nope")).is_err());
    }
}

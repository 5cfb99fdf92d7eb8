use std::path::{Path, PathBuf};

use crate::config::AppConfig;

pub const NON_PHOTOS_DIR: &str = "_non_photos";
pub const UNTAGGED_PHOTOS_DIR: &str = "_untagged_photos";
pub const ORIGINALS_DIR: &str = "_originals";
pub const EXTRA_JPGS_DIR: &str = "_extra_jpgs";
pub const BY_DATE_DIR: &str = "by-date";
pub const GEOTAG_PENDING_DIR: &str = "_geotag_pending";
pub const GEOTAG_UNTAGGABLE_DIR: &str = "_geotag_untaggable";

/// Working directories of a photo collection rooted at `root`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    workspace: PathBuf,
    duplicates_trash: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, config: &AppConfig) -> Self {
        let root = root.into();
        Self {
            workspace: root.join(&config.workspace_dir),
            duplicates_trash: root.join(&config.duplicates_trash_dir),
            root,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn duplicates_trash(&self) -> &Path {
        &self.duplicates_trash
    }

    pub fn non_photos(&self) -> PathBuf {
        self.root.join(NON_PHOTOS_DIR)
    }

    pub fn untagged_photos(&self) -> PathBuf {
        self.root.join(UNTAGGED_PHOTOS_DIR)
    }

    pub fn originals(&self) -> PathBuf {
        self.root.join(ORIGINALS_DIR)
    }

    pub fn extra_jpgs(&self) -> PathBuf {
        self.root.join(EXTRA_JPGS_DIR)
    }

    pub fn by_date(&self) -> PathBuf {
        self.root.join(BY_DATE_DIR)
    }

    pub fn geotag_pending(&self) -> PathBuf {
        self.root.join(GEOTAG_PENDING_DIR)
    }

    pub fn geotag_untaggable(&self) -> PathBuf {
        self.root.join(GEOTAG_UNTAGGABLE_DIR)
    }

    /// Every directory the tool itself writes into. Phases never scan these.
    pub fn special_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.workspace.clone(),
            self.duplicates_trash.clone(),
            self.non_photos(),
            self.untagged_photos(),
            self.originals(),
            self.extra_jpgs(),
            self.geotag_pending(),
            self.geotag_untaggable(),
        ]
    }

    /// Display form of `path` relative to the root, falling back to the full path.
    pub fn display_relative(&self, path: &Path) -> String {
        let root = crate::scanner::resolve_path(&self.root);
        path.strip_prefix(&root)
            .or_else(|_| path.strip_prefix(&self.root))
            .map(|rel| format!("./{}", rel.display()))
            .unwrap_or_else(|_| path.display().to_string())
    }
}

use ahash::AHashMap;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{has_extension_in, AppConfig};
use crate::error::Error;
use crate::layout::Layout;
use crate::progress::ProgressReporter;

/// Developed-JPEG suffix, e.g. `IMG_1__std.jpg` next to the folder holding `IMG_1.tif`.
pub const STD_JPEG_SUFFIX: &str = "__std.jpg";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevelopReport {
    pub raw_files: usize,
    pub tiff_files: usize,
    /// Folders holding a RAW file with no same-stem TIFF anywhere beneath the folder.
    pub needs_tiff: BTreeSet<PathBuf>,
    /// Folders holding a TIFF whose parent folder lacks `<stem>__std.jpg`.
    pub needs_std_jpeg: BTreeSet<PathBuf>,
}

fn tiff_extensions() -> Vec<String> {
    vec!["tif".to_string(), "tiff".to_string()]
}

/// List the folders that still need a development step. Read-only.
pub fn run_to_develop(
    root: &Path,
    config: &AppConfig,
    reporter: &dyn ProgressReporter,
) -> Result<DevelopReport, Error> {
    let root = super::resolve_root(root)?;
    let layout = Layout::new(&root, config);
    reporter.on_scan_start(&root);
    let files = super::classifier(&layout.special_dirs(), config)
        .collect_files(&root)?
        .files;
    reporter.on_scan_complete(files.len(), 0.0);

    let tiff_exts = tiff_extensions();
    let (raws, tiffs): (Vec<&PathBuf>, Vec<&PathBuf>) = (
        files.iter().filter(|f| config.file_formats.is_raw(f)).collect(),
        files.iter().filter(|f| has_extension_in(f, &tiff_exts)).collect(),
    );

    // stem -> folders holding a TIFF of that stem
    let mut tiff_dirs: AHashMap<OsString, Vec<&Path>> = AHashMap::new();
    for tiff in &tiffs {
        if let (Some(stem), Some(dir)) = (tiff.file_stem(), tiff.parent()) {
            tiff_dirs.entry(stem.to_os_string()).or_default().push(dir);
        }
    }

    let mut report = DevelopReport {
        raw_files: raws.len(),
        tiff_files: tiffs.len(),
        ..Default::default()
    };

    for raw in &raws {
        let (Some(stem), Some(dir)) = (raw.file_stem(), raw.parent()) else {
            continue;
        };
        let developed = tiff_dirs
            .get(stem)
            .is_some_and(|dirs| dirs.iter().any(|d| d.starts_with(dir)));
        if !developed {
            report.needs_tiff.insert(dir.to_path_buf());
        }
    }
    info!(
        "Found {} folders with RAW files needing TIFF generation.",
        report.needs_tiff.len()
    );

    for tiff in &tiffs {
        let (Some(stem), Some(dir)) = (tiff.file_stem(), tiff.parent()) else {
            continue;
        };
        let Some(parent) = dir.parent() else {
            continue;
        };
        let mut expected = stem.to_os_string();
        expected.push(STD_JPEG_SUFFIX);
        if !parent.join(expected).exists() {
            report.needs_std_jpeg.insert(dir.to_path_buf());
        }
    }
    info!(
        "Found {} folders with TIFF files needing standard JPEG generation.",
        report.needs_std_jpeg.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_nested_tiff_counts_as_developed() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("day/tif")).unwrap();
        fs::create_dir_all(root.join("other")).unwrap();
        fs::write(root.join("day/IMG_1.srw"), b"raw").unwrap();
        fs::write(root.join("day/tif/IMG_1.tif"), b"tif").unwrap();
        fs::write(root.join("day/IMG_1__std.jpg"), b"jpg").unwrap();
        fs::write(root.join("other/IMG_2.srw"), b"raw").unwrap();

        let report = run_to_develop(&root, &AppConfig::default(), &SilentReporter).unwrap();
        assert_eq!(report.raw_files, 2);
        assert_eq!(report.tiff_files, 1);
        assert_eq!(report.needs_tiff, BTreeSet::from([root.join("other")]));
        assert!(report.needs_std_jpeg.is_empty());
    }
}

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use photoflow_core::oracle::memory::OracleCall;
use photoflow_core::oracle::{TAG_DATE_TIME_ORIGINAL, TAG_MODEL};
use photoflow_core::{
    run_by_date, run_pair_jpegs, run_timeshift, run_to_develop, AppConfig, Error, MemoryOracle,
    SilentReporter,
};

fn canonical_root(tmp: &Path) -> PathBuf {
    let root = fs::canonicalize(tmp).unwrap().join("photos");
    fs::create_dir_all(&root).unwrap();
    root
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, path.file_name().unwrap().to_string_lossy().as_bytes()).unwrap();
}

#[test]
fn test_timeshift_sorts_files_by_outcome() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    touch(&root.join("a.jpg"));
    touch(&root.join("b.jpg"));
    touch(&root.join("c.txt"));
    touch(&root.join("x/old.jpg_original"));

    let oracle = MemoryOracle::new()
        .with_tag("a.jpg", TAG_DATE_TIME_ORIGINAL, "2023:07:14 18:02:11")
        .failing_time_shift("c.txt");

    let summary = run_timeshift(
        &root,
        &AppConfig::default(),
        "+=0:0:0 1:00:00",
        false,
        &oracle,
        &SilentReporter,
    )
    .unwrap();

    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.no_tags, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.originals_moved, 1);

    assert!(root.join("a.jpg").exists());
    assert!(root.join("_untagged_photos/b.jpg").exists());
    assert!(root.join("_non_photos/c.txt").exists());
    assert!(root.join("_originals/old.jpg").exists());
    assert!(!root.join("x/old.jpg_original").exists());

    // One single-file call per candidate, backups never submitted
    let shifted: Vec<OracleCall> = oracle.calls();
    assert_eq!(shifted.len(), 3);
    assert!(shifted
        .iter()
        .all(|c| matches!(c, OracleCall::TimeShift { files } if files.len() == 1)));
}

#[test]
fn test_timeshift_rejects_bad_offset_before_touching_anything() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    touch(&root.join("a.jpg"));
    let oracle = MemoryOracle::new();

    let result = run_timeshift(
        &root,
        &AppConfig::default(),
        "+1:00:00",
        false,
        &oracle,
        &SilentReporter,
    );

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert!(oracle.calls().is_empty());
}

#[test]
fn test_timeshift_dry_run_and_unavailable_tool() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    touch(&root.join("a.jpg"));
    touch(&root.join("x/old.jpg_original"));

    let oracle = MemoryOracle::new();
    let summary = run_timeshift(
        &root,
        &AppConfig::default(),
        "-=0:0:1",
        true,
        &oracle,
        &SilentReporter,
    )
    .unwrap();
    assert_eq!(summary.planned, 1);
    assert_eq!(summary.originals_moved, 1);
    assert!(oracle.calls().is_empty());
    assert!(root.join("x/old.jpg_original").exists());

    let offline = MemoryOracle::new().unavailable();
    let result = run_timeshift(
        &root,
        &AppConfig::default(),
        "-=0:0:1",
        false,
        &offline,
        &SilentReporter,
    );
    assert!(matches!(result, Err(Error::OracleUnavailable(_))));
    assert!(root.join("a.jpg").exists());
}

#[test]
fn test_pair_jpegs_moves_only_verified_jpegs() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    for name in ["IMG_1.srw", "IMG_1.jpg", "IMG_2.srw", "IMG_2.jpg", "IMG_3.srw"] {
        touch(&root.join("day").join(name));
    }

    let oracle = MemoryOracle::new()
        .with_tag("IMG_1.srw", TAG_MODEL, "NX300")
        .with_tag("IMG_1.srw", TAG_DATE_TIME_ORIGINAL, "2023:07:14 18:02:11")
        .with_tag("IMG_1.jpg", TAG_MODEL, "NX300")
        .with_tag("IMG_1.jpg", TAG_DATE_TIME_ORIGINAL, "2023:07:14 18:02:12")
        .with_tag("IMG_2.srw", TAG_MODEL, "NX300")
        .with_tag("IMG_2.srw", TAG_DATE_TIME_ORIGINAL, "2023:07:14 18:02:11")
        .with_tag("IMG_2.jpg", TAG_MODEL, "NX300")
        .with_tag("IMG_2.jpg", TAG_DATE_TIME_ORIGINAL, "2023:07:14 18:02:16");

    let summary =
        run_pair_jpegs(&root, &AppConfig::default(), false, &oracle, &SilentReporter).unwrap();

    assert_eq!(summary.raw_files, 3);
    assert_eq!(summary.pairs_by_name, 2);
    assert_eq!(summary.pairs_verified, 1);
    assert_eq!(summary.jpegs_moved, 1);
    assert_eq!(summary.unverified, 1);
    assert_eq!(summary.errors, 0);

    assert!(root.join("_extra_jpgs/IMG_1.jpg").exists());
    assert!(!root.join("day/IMG_1.jpg").exists());
    assert!(root.join("day/IMG_1.srw").exists());
    assert!(root.join("day/IMG_2.jpg").exists());

    // Both halves of a pair are read in one call
    let reads: Vec<OracleCall> = oracle.calls();
    assert_eq!(reads.len(), 2);
    assert!(reads
        .iter()
        .all(|c| matches!(c, OracleCall::ReadTags { files } if files.len() == 2)));
}

#[test]
fn test_by_date_files_dated_photos_with_collision_counter() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    touch(&root.join("trip/a.jpg"));
    touch(&root.join("trip/b.JPG"));
    touch(&root.join("c.png"));
    touch(&root.join("_keep/d.jpg"));

    let oracle = MemoryOracle::new()
        .with_tag("a.jpg", TAG_DATE_TIME_ORIGINAL, "2023:07:14 18:02:11")
        .with_tag("b.JPG", TAG_DATE_TIME_ORIGINAL, "2023:07:14 18:02:11")
        .with_tag("d.jpg", TAG_DATE_TIME_ORIGINAL, "2023:07:15 09:00:00");

    let planned =
        run_by_date(&root, &AppConfig::default(), true, &oracle, &SilentReporter).unwrap();
    assert_eq!(planned.filed, 2);
    assert!(root.join("trip/a.jpg").exists());
    assert!(!root.join("by-date").exists());

    let summary =
        run_by_date(&root, &AppConfig::default(), false, &oracle, &SilentReporter).unwrap();
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.filed, 2);
    assert_eq!(summary.undated, 1);
    assert_eq!(summary.errors, 0);

    let day = root.join("by-date/2023-07-14");
    assert!(day.join("2023-07-14--18-02-11.jpg").exists());
    assert!(day.join("2023-07-14--18-02-11-01.jpg").exists());
    assert!(root.join("c.png").exists());
    assert!(root.join("_keep/d.jpg").exists());
}

#[test]
fn test_to_develop_lists_folders_needing_work() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    touch(&root.join("done/IMG_1.srw"));
    touch(&root.join("done/tif/IMG_1.tif"));
    touch(&root.join("done/IMG_1__std.jpg"));
    touch(&root.join("half/IMG_2.srw"));
    touch(&root.join("half/tif/IMG_2.TIFF"));
    touch(&root.join("raw_only/IMG_3.nef"));

    let report = run_to_develop(&root, &AppConfig::default(), &SilentReporter).unwrap();

    assert_eq!(report.raw_files, 3);
    assert_eq!(report.tiff_files, 2);
    assert_eq!(report.needs_tiff, BTreeSet::from([root.join("raw_only")]));
    assert_eq!(report.needs_std_jpeg, BTreeSet::from([root.join("half/tif")]));
}

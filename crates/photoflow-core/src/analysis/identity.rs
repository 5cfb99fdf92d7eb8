use ahash::AHashMap;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::hasher::{self, ChecksumAlgorithm};

/// A file seen during one scan pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub checksum: String,
}

impl FileRecord {
    pub fn new(path: impl Into<PathBuf>, size: u64, checksum: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            size,
            checksum: checksum.into(),
        }
    }
}

/// Which fields make two records "the same file".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    /// (size, checksum): identical content under any name.
    #[default]
    Content,
    /// (name, size, checksum): the legacy strict variant.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityKey {
    Content {
        size: u64,
        checksum: String,
    },
    Strict {
        name: String,
        size: u64,
        checksum: String,
    },
}

impl IdentityKey {
    pub fn of(record: &FileRecord, mode: KeyMode) -> Self {
        match mode {
            KeyMode::Content => IdentityKey::Content {
                size: record.size,
                checksum: record.checksum.clone(),
            },
            KeyMode::Strict => IdentityKey::Strict {
                name: record.name.clone(),
                size: record.size,
                checksum: record.checksum.clone(),
            },
        }
    }
}

/// Records sharing one identity key, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityGroup {
    pub key: IdentityKey,
    pub members: Vec<FileRecord>,
}

impl IdentityGroup {
    pub fn is_duplicate_set(&self) -> bool {
        self.members.len() > 1
    }

    /// The lexicographically first path.
    pub fn keeper(&self) -> &FileRecord {
        &self.members[0]
    }

    pub fn duplicates(&self) -> &[FileRecord] {
        &self.members[1..]
    }
}

/// Files sharing a name. Reportable only when the content differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictGroup {
    pub name: String,
    /// Sorted by (checksum, path).
    pub members: Vec<FileRecord>,
    pub distinct_checksums: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityAnalysis {
    /// Every identity group, ordered by key.
    pub groups: Vec<IdentityGroup>,
    /// Reportable naming conflicts, ordered by name.
    pub conflicts: Vec<ConflictGroup>,
}

impl IdentityAnalysis {
    pub fn duplicate_groups(&self) -> impl Iterator<Item = &IdentityGroup> {
        self.groups.iter().filter(|g| g.is_duplicate_set())
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicate_groups().map(|g| g.duplicates().len()).sum()
    }
}

/// Group records by identity and, independently, by name.
///
/// Duplication and naming conflicts are reported separately: a file can duplicate another
/// under a different name while unrelated files collide by name. Output order depends only
/// on keys, never on input order.
pub fn find_duplicates_and_conflicts(records: &[FileRecord], mode: KeyMode) -> IdentityAnalysis {
    let mut by_key: BTreeMap<IdentityKey, Vec<FileRecord>> = BTreeMap::new();
    let mut by_name: AHashMap<&str, Vec<&FileRecord>> = AHashMap::new();

    for record in records {
        by_key
            .entry(IdentityKey::of(record, mode))
            .or_default()
            .push(record.clone());
        by_name.entry(record.name.as_str()).or_default().push(record);
    }

    let groups = by_key
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by(|a, b| a.path.cmp(&b.path));
            IdentityGroup { key, members }
        })
        .collect::<Vec<_>>();

    let mut conflicts = by_name
        .into_iter()
        .filter_map(|(name, items)| {
            let distinct_checksums: BTreeSet<String> =
                items.iter().map(|r| r.checksum.clone()).collect();
            if distinct_checksums.len() < 2 {
                return None;
            }
            let mut members: Vec<FileRecord> = items.into_iter().cloned().collect();
            members.sort_by(|a, b| (&a.checksum, &a.path).cmp(&(&b.checksum, &b.path)));
            Some(ConflictGroup {
                name: name.to_string(),
                members,
                distinct_checksums,
            })
        })
        .collect::<Vec<_>>();
    conflicts.sort_by(|a, b| a.name.cmp(&b.name));

    debug!(
        "{} identity groups, {} conflicting names",
        groups.len(),
        conflicts.len()
    );
    IdentityAnalysis { groups, conflicts }
}

/// Size and checksum every file in parallel. Files that cannot be read are returned
/// separately instead of being grouped. Both lists come back sorted by path.
pub fn build_file_records(
    files: &[PathBuf],
    algorithm: ChecksumAlgorithm,
) -> (Vec<FileRecord>, Vec<PathBuf>) {
    let results: Vec<(PathBuf, Option<FileRecord>)> = files
        .par_iter()
        .map(|path| (path.clone(), fingerprint(path, algorithm)))
        .collect();

    let mut records = Vec::with_capacity(results.len());
    let mut unreadable = Vec::new();
    for (path, record) in results {
        match record {
            Some(record) => records.push(record),
            None => unreadable.push(path),
        }
    }
    records.sort_by(|a, b| a.path.cmp(&b.path));
    unreadable.sort();
    (records, unreadable)
}

fn fingerprint(path: &Path, algorithm: ChecksumAlgorithm) -> Option<FileRecord> {
    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            warn!("Error reading metadata for {}: {}", path.display(), e);
            return None;
        }
    };
    let checksum = hasher::checksum_file(path, algorithm)?;
    Some(FileRecord::new(path, size, checksum))
}

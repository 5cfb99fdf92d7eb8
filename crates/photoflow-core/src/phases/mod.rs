//! The six batch phases. Each takes a scan root, the configuration and a dry-run switch,
//! and returns a summary of named counters in which every input file is counted once.

pub mod by_date;
pub mod dedup;
pub mod develop;
pub mod geotag;
pub mod pairs;
pub mod timeshift;

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::Error;
use crate::oracle::OracleError;
use crate::scanner::PathClassifier;

pub(crate) fn resolve_root(root: &Path) -> Result<PathBuf, Error> {
    fs::canonicalize(root).map_err(|e| {
        Error::InvalidInput(format!(
            "Scan root '{}' is not accessible: {}",
            root.display(),
            e
        ))
    })
}

/// Unavailability ends the phase; any other oracle failure is handed back for local handling.
pub(crate) fn escalate(err: OracleError) -> Result<OracleError, Error> {
    match err {
        OracleError::Unavailable(msg) => Err(Error::OracleUnavailable(msg)),
        other => Ok(other),
    }
}

pub(crate) fn classifier(excluded: &[PathBuf], config: &AppConfig) -> PathClassifier {
    PathClassifier::new(excluded).with_ignore_patterns(&config.ignore_patterns)
}

pub(crate) fn batch_size(config: &AppConfig) -> usize {
    config.oracle.batch_size.max(1)
}

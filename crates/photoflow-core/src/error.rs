use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(
        "Could not read or parse configuration file at {}: {reason}. \
         Please fix or delete the file to allow recreation.",
        .path.display()
    )]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("Could not write configuration file at {}: {reason}", .path.display())]
    ConfigWrite { path: PathBuf, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown checksum algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("Metadata tool unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Report error: {0}")]
    Report(#[from] csv::Error),
}

use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::commands::Cli;

const DEFAULT_LOG_FILE: &str = "./logs/photoflow.log";

/// Log level and file for one run. Command-line flags win over the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub file: PathBuf,
}

impl LogSettings {
    pub fn from_cli(cli: &Cli) -> Self {
        let filter = if cli.verbose {
            "debug".to_string()
        } else {
            env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string())
        };
        let file = cli
            .log_file
            .clone()
            .or_else(|| env::var_os("LOG_FILE_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
        Self { filter, file }
    }

    /// `rolling::never` takes the directory and the file name separately.
    fn split_file(&self) -> (PathBuf, PathBuf) {
        let dir = match self.file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = self
            .file
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("photoflow.log"));
        (dir, name)
    }
}

/// Console output for people, plus a plain-text file that keeps thread ids so the
/// parallel hashing stage can be untangled afterwards.
pub fn init_logger(settings: &LogSettings) -> WorkerGuard {
    let (dir, name) = settings.split_file();
    let file_appender = tracing_appender::rolling::never(&dir, &name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_thread_ids(true)
                .with_ansi(false),
        )
        .with(EnvFilter::new(&settings.filter))
        .init();

    info!("Logging to {}", dir.join(&name).display());

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flags_override_environment() {
        let cli = Cli::parse_from(["photoflow", "-v", "--log-file", "run.log", "dedup"]);
        let settings = LogSettings::from_cli(&cli);
        assert_eq!(settings.filter, "debug");
        assert_eq!(settings.file, PathBuf::from("run.log"));
        assert_eq!(
            settings.split_file(),
            (PathBuf::from("."), PathBuf::from("run.log"))
        );
    }

    #[test]
    fn test_nested_log_file_is_split_into_dir_and_name() {
        let settings = LogSettings {
            filter: "info".to_string(),
            file: PathBuf::from("/var/log/photoflow/today.log"),
        };
        assert_eq!(
            settings.split_file(),
            (
                PathBuf::from("/var/log/photoflow"),
                PathBuf::from("today.log")
            )
        );
    }
}

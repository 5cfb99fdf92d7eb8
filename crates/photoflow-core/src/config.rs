use config::{Config, Environment, File as ConfigFile, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Error;

pub const CONFIG_DIR_NAME: &str = "photoflow";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable pointing at an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "PHOTOFLOW_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory (relative to the scan root) receiving reports and scripts.
    pub workspace_dir: String,
    /// Directory (relative to the scan root) receiving relocated duplicates.
    pub duplicates_trash_dir: String,
    pub file_formats: FileFormats,
    pub dedup: DedupConfig,
    /// Glob patterns matched against file names; matching files are never scanned.
    pub ignore_patterns: Vec<String>,
    pub oracle: OracleConfig,
    pub geotag: GeotagConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileFormats {
    pub raw: Vec<String>,
    pub image: Vec<String>,
    pub video: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub checksum_algorithm: String,
    /// Use the legacy (name, size, checksum) identity instead of (size, checksum).
    pub strict_identity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub program: String,
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeotagConfig {
    pub extrapolation_window_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace_dir: "_photo_workspace".to_string(),
            duplicates_trash_dir: "_duplicates".to_string(),
            file_formats: FileFormats::default(),
            dedup: DedupConfig::default(),
            ignore_patterns: vec!["*_original".to_string(), "*.tmp".to_string()],
            oracle: OracleConfig::default(),
            geotag: GeotagConfig::default(),
        }
    }
}

impl Default for FileFormats {
    fn default() -> Self {
        let list = |exts: &[&str]| exts.iter().map(|e| e.to_string()).collect();
        Self {
            raw: list(&["srw", "cr2", "nef", "arw", "dng"]),
            image: list(&["jpg", "jpeg", "png", "tif", "tiff", "heic"]),
            video: list(&["mp4", "mov", "avi", "mts"]),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            checksum_algorithm: "md5".to_string(),
            strict_identity: false,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            program: "exiftool".to_string(),
            batch_size: 200,
        }
    }
}

impl Default for GeotagConfig {
    fn default() -> Self {
        Self {
            extrapolation_window_secs: 24 * 60 * 60,
        }
    }
}

impl FileFormats {
    pub fn is_raw(&self, path: &Path) -> bool {
        has_extension_in(path, &self.raw)
    }

    /// Image extensions that name JPEG variants (`jpg`, `jpeg`, ...), in configured order.
    pub fn jpeg_extensions(&self) -> Vec<&str> {
        self.image
            .iter()
            .map(|e| e.as_str())
            .filter(|e| e.starts_with("jp"))
            .collect()
    }
}

/// Case-insensitive extension test against a list of lowercase extensions without dots.
pub fn has_extension_in(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_lowercase();
            extensions.iter().any(|x| *x == lower)
        })
        .unwrap_or(false)
}

/// Location of the configuration file: `$PHOTOFLOW_CONFIG`, else the platform config directory.
pub fn config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

pub fn load_configuration() -> Result<AppConfig, Error> {
    load_or_create(&config_path())
}

/// Load the configuration at `path`, materializing and persisting the defaults when it
/// does not exist yet. A file that exists but cannot be parsed is never overwritten.
pub fn load_or_create(path: &Path) -> Result<AppConfig, Error> {
    if !path.exists() {
        info!(
            "Configuration file not found. Creating a default one at: {}",
            path.display()
        );
        let config = AppConfig::default();
        persist(path, &config)?;
        return Ok(config);
    }

    debug!("Loading configuration from {}", path.display());
    let corrupt = |e: config::ConfigError| Error::ConfigCorrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let builder = Config::builder()
        .add_source(ConfigFile::from(path).format(FileFormat::Toml).required(true))
        .add_source(Environment::with_prefix("PHOTOFLOW").separator("__"))
        .build()
        .map_err(corrupt)?;
    builder.try_deserialize::<AppConfig>().map_err(corrupt)
}

pub fn persist(path: &Path, config: &AppConfig) -> Result<(), Error> {
    let write_err = |reason: String| Error::ConfigWrite {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let text = toml::to_string_pretty(config).map_err(|e| write_err(e.to_string()))?;
    fs::write(path, text).map_err(|e| write_err(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_materialized() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = load_or_create(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        // A second load reads the persisted file back.
        let reloaded = load_or_create(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "workspace_dir = \"_ws\"\n\n[dedup]\nchecksum_algorithm = \"sha256\"\n",
        )
        .unwrap();

        let config = load_or_create(&path).unwrap();
        assert_eq!(config.workspace_dir, "_ws");
        assert_eq!(config.dedup.checksum_algorithm, "sha256");
        assert!(!config.dedup.strict_identity);
        assert_eq!(config.duplicates_trash_dir, "_duplicates");
        assert_eq!(config.file_formats, FileFormats::default());
    }

    #[test]
    fn test_corrupt_config_is_fatal_and_untouched() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let garbage = "workspace_dir = [[[ not toml";
        fs::write(&path, garbage).unwrap();

        let err = load_or_create(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigCorrupt { .. }));
        assert!(err.to_string().contains("fix or delete"));
        assert_eq!(fs::read_to_string(&path).unwrap(), garbage);
    }

    #[test]
    fn test_extension_helpers() {
        let formats = FileFormats::default();
        assert!(formats.is_raw(Path::new("a/IMG_1.SRW")));
        assert!(!formats.is_raw(Path::new("a/IMG_1.jpg")));
        assert!(!formats.is_raw(Path::new("a/noext")));
        assert_eq!(formats.jpeg_extensions(), vec!["jpg", "jpeg"]);
    }
}

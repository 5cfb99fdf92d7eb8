//! Boundary to the external metadata tool.
//!
//! The core only needs call/response semantics: read named tags, apply a time shift,
//! apply a geotag. [`exiftool::ExifTool`] shells out to exiftool; [`memory::MemoryOracle`]
//! is the in-memory stand-in used by tests.

pub mod exiftool;
pub mod memory;

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::error::Error;

pub use exiftool::ExifTool;
pub use memory::MemoryOracle;

pub const TAG_GPS_LATITUDE: &str = "GPSLatitude";
pub const TAG_DATE_TIME_ORIGINAL: &str = "DateTimeOriginal";
pub const TAG_MODEL: &str = "Model";

static TIME_SHIFT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?=\d+:\d+:\d+( \d+:\d+:\d+)?$").expect("invalid time shift regex")
});

static TIMEZONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]\d{2}:\d{2}$").expect("invalid timezone regex"));

/// Tag name -> value for one file. A tag the file lacks is simply absent.
pub type TagValues = BTreeMap<String, String>;
pub type TagMap = BTreeMap<PathBuf, TagValues>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The tool cannot be started at all. Fatal for the phase.
    #[error("metadata tool unavailable: {0}")]
    Unavailable(String),
    /// One call failed (crash, timeout, unparseable output). Fatal only for that batch.
    #[error("metadata tool call failed: {0}")]
    Failed(String),
}

pub trait MetadataOracle: Send + Sync {
    fn read_tags(&self, files: &[PathBuf], tags: &[&str]) -> Result<TagMap, OracleError>;

    /// Returns how many files were updated. Partial success is normal.
    fn apply_time_shift(&self, files: &[PathBuf], shift: &TimeShift)
        -> Result<usize, OracleError>;

    /// Returns how many files were updated. The count says nothing about which ones.
    fn apply_geotag(&self, files: &[PathBuf], request: &GeotagRequest)
        -> Result<usize, OracleError>;

    /// The subset of `files` carrying a non-empty `tag`.
    fn files_with_tag(&self, files: &[PathBuf], tag: &str) -> Result<BTreeSet<PathBuf>, OracleError> {
        if files.is_empty() {
            return Ok(BTreeSet::new());
        }
        let tags = self.read_tags(files, &[tag])?;
        Ok(tags
            .into_iter()
            .filter(|(_, values)| values.get(tag).is_some_and(|v| !v.trim().is_empty()))
            .map(|(path, _)| path)
            .collect())
    }
}

/// A validated date shift such as `+=1:30:0` or `-=0:0:1 2:00:00`
/// (`[+|-]=Y:M:D[ H:M:S]`, or a bare `=` to set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeShift {
    instruction: String,
}

impl TimeShift {
    pub fn parse(offset: &str) -> Result<Self, Error> {
        if !TIME_SHIFT_PATTERN.is_match(offset) {
            return Err(Error::InvalidInput(format!(
                "Invalid offset format: '{}'. Expected format like '+=Y:M:D H:M:S'.",
                offset
            )));
        }
        Ok(Self {
            instruction: offset.to_string(),
        })
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

/// A validated UTC offset like `+02:00` or `-05:00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timezone(String);

impl Timezone {
    pub fn parse(value: &str) -> Result<Self, Error> {
        if !TIMEZONE_PATTERN.is_match(value) {
            return Err(Error::InvalidInput(format!(
                "Invalid timezone format: '{}'. Expected format like '+02:00' or '-05:00'.",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an EXIF timestamp (`2023:07:14 18:02:11`, optionally followed by sub-seconds or
/// a zone, which are ignored).
pub fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let head = value.get(..19).unwrap_or(value);
    NaiveDateTime::parse_from_str(head, "%Y:%m:%d %H:%M:%S").ok()
}

/// How far a geotag write may reach from the nearest track point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeotagMode {
    /// Only between bracketing track points; never extrapolates.
    Interpolate,
    /// Also from the nearest track point within `window_secs`.
    Extrapolate { window_secs: u64 },
}

impl GeotagMode {
    /// The extrapolation limit handed to the tool. Zero disables extrapolation.
    pub fn max_extrapolation_secs(self) -> u64 {
        match self {
            GeotagMode::Interpolate => 0,
            GeotagMode::Extrapolate { window_secs } => window_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeotagRequest {
    /// Glob over the GPX track files, e.g. `/tracks/*.gpx`.
    pub gpx_pattern: String,
    pub timezone: Timezone,
    pub mode: GeotagMode,
}

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, trace, warn};

use super::{GeotagRequest, MetadataOracle, OracleError, TagMap, TagValues, TimeShift};

/// Files per read invocation, keeping command lines well under platform limits.
const READ_CHUNK: usize = 500;

/// Metadata oracle backed by the external `exiftool` program.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `exiftool -ver`. Used as the dependency check before any phase that needs it.
    pub fn probe(&self) -> Result<String, OracleError> {
        let output = self.run(vec![OsString::from("-ver")])?;
        if !output.status.success() {
            return Err(OracleError::Unavailable(format!(
                "{} -ver exited with {}",
                self.program.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run(&self, args: Vec<OsString>) -> Result<Output, OracleError> {
        trace!("{} {:?}", self.program.display(), args);
        Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| self.spawn_error(e))
    }

    fn spawn_error(&self, err: io::Error) -> OracleError {
        OracleError::Unavailable(format!(
            "could not start '{}': {}",
            self.program.display(),
            err
        ))
    }

    fn write(&self, mut args: Vec<OsString>, files: &[PathBuf]) -> Result<usize, OracleError> {
        if files.is_empty() {
            return Ok(0);
        }
        args.extend(files.iter().map(|f| f.as_os_str().to_os_string()));

        let output = self.run(args)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        match parse_updated_count(&stdout) {
            Some(count) => {
                if !stderr.trim().is_empty() {
                    warn!("exiftool reported errors: {}", stderr.trim());
                }
                debug!("exiftool updated {} of {} files", count, files.len());
                Ok(count)
            }
            None if output.status.success() => Ok(0),
            None => Err(OracleError::Failed(format!(
                "exiftool exited with {}: {}",
                output.status,
                stderr.trim()
            ))),
        }
    }

    fn read_chunk(&self, files: &[PathBuf], tags: &[&str]) -> Result<TagMap, OracleError> {
        let mut args: Vec<OsString> = vec!["-json".into(), "-q".into()];
        args.extend(tags.iter().map(|t| OsString::from(format!("-{}", t))));
        args.extend(files.iter().map(|f| f.as_os_str().to_os_string()));

        let output = self.run(args)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            if output.status.success() {
                return Ok(TagMap::new());
            }
            return Err(OracleError::Failed(format!(
                "exiftool exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_tag_json(&stdout, files)
    }
}

impl MetadataOracle for ExifTool {
    fn read_tags(&self, files: &[PathBuf], tags: &[&str]) -> Result<TagMap, OracleError> {
        let mut result = TagMap::new();
        for chunk in files.chunks(READ_CHUNK) {
            result.extend(self.read_chunk(chunk, tags)?);
        }
        Ok(result)
    }

    fn apply_time_shift(
        &self,
        files: &[PathBuf],
        shift: &TimeShift,
    ) -> Result<usize, OracleError> {
        let args = vec![
            OsString::from("-m"),
            OsString::from(format!("-AllDates{}", shift.instruction())),
        ];
        self.write(args, files)
    }

    fn apply_geotag(
        &self,
        files: &[PathBuf],
        request: &GeotagRequest,
    ) -> Result<usize, OracleError> {
        self.write(geotag_args(request), files)
    }
}

/// Writes coordinates from the GPX tracks, matching each photo's local capture time
/// against the track in the given zone. `GeoMaxExtSecs` is always explicit: exiftool
/// extrapolates up to 1800s when it is left unset.
fn geotag_args(request: &GeotagRequest) -> Vec<OsString> {
    vec![
        OsString::from("-overwrite_original"),
        OsString::from("-P"),
        OsString::from(format!("-geotime<${{DateTimeOriginal}}{}", request.timezone)),
        OsString::from("-geotag"),
        OsString::from(&request.gpx_pattern),
        OsString::from("-api"),
        OsString::from(format!(
            "GeoMaxExtSecs={}",
            request.mode.max_extrapolation_secs()
        )),
    ]
}

static UPDATED_COUNT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) image files updated").expect("invalid update count regex"));

/// Pull `N` out of exiftool's "    N image files updated" summary line.
fn parse_updated_count(stdout: &str) -> Option<usize> {
    UPDATED_COUNT_PATTERN
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|count| count.as_str().parse().ok())
}

/// Map exiftool's `-json` array back onto the paths that were asked for.
fn parse_tag_json(stdout: &str, files: &[PathBuf]) -> Result<TagMap, OracleError> {
    let entries: Vec<serde_json::Map<String, Value>> = serde_json::from_str(stdout)
        .map_err(|e| OracleError::Failed(format!("unparseable exiftool output: {}", e)))?;

    let by_name: HashMap<String, &PathBuf> = files
        .iter()
        .map(|f| (path_key(f), f))
        .collect();

    let mut result = TagMap::new();
    for mut entry in entries {
        let source = match entry.remove("SourceFile") {
            Some(Value::String(s)) => s,
            _ => continue,
        };
        let path = by_name
            .get(&path_key(Path::new(&source)))
            .map(|p| (*p).clone())
            .unwrap_or_else(|| PathBuf::from(&source));

        let values: TagValues = entry
            .into_iter()
            .map(|(tag, value)| {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (tag, text)
            })
            .collect();
        result.insert(path, values);
    }
    Ok(result)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

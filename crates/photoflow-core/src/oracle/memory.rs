use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{
    GeotagMode, GeotagRequest, MetadataOracle, OracleError, TagMap, TagValues, TimeShift,
    TAG_DATE_TIME_ORIGINAL, TAG_GPS_LATITUDE,
};

/// One recorded call, for assertions about batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleCall {
    ReadTags { files: Vec<String> },
    TimeShift { files: Vec<String> },
    Geotag { files: Vec<String>, extrapolation: Option<u64> },
}

#[derive(Debug, Default)]
struct MemoryState {
    tags: HashMap<String, TagValues>,
    interpolation_coverage: HashSet<String>,
    extrapolation_coverage: HashSet<String>,
    time_shift_failures: HashSet<String>,
    failing_geotag_calls: usize,
    /// Geotag calls answered before the tool goes away for good.
    geotag_calls_before_outage: Option<usize>,
    unavailable: bool,
    calls: Vec<OracleCall>,
}

/// In-memory metadata oracle. Files are identified by file name, so tests can move them
/// around on disk freely.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    state: Mutex<MemoryState>,
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn names_of(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|f| name_of(f)).collect()
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(self, f: impl FnOnce(&mut MemoryState)) -> Self {
        f(&mut self.state.lock().unwrap_or_else(|e| e.into_inner()));
        self
    }

    pub fn with_tag(self, file: &str, tag: &str, value: &str) -> Self {
        self.with_state(|s| {
            s.tags
                .entry(file.to_string())
                .or_default()
                .insert(tag.to_string(), value.to_string());
        })
    }

    /// The file already carries GPS coordinates.
    pub fn with_gps(self, file: &str) -> Self {
        self.with_tag(file, TAG_GPS_LATITUDE, "48.8584")
    }

    /// Track points bracket the file's timestamp.
    pub fn covered_by_interpolation(self, file: &str) -> Self {
        self.with_state(|s| {
            s.interpolation_coverage.insert(file.to_string());
        })
    }

    /// Only a track point inside the extrapolation window is near the file's timestamp.
    pub fn covered_by_extrapolation(self, file: &str) -> Self {
        self.with_state(|s| {
            s.extrapolation_coverage.insert(file.to_string());
        })
    }

    pub fn failing_time_shift(self, file: &str) -> Self {
        self.with_state(|s| {
            s.time_shift_failures.insert(file.to_string());
        })
    }

    /// The next `count` geotag calls crash before reporting anything.
    pub fn fail_next_geotag_calls(self, count: usize) -> Self {
        self.with_state(|s| s.failing_geotag_calls = count)
    }

    /// Answer `count` geotag calls, then become unavailable for every later call.
    pub fn unavailable_after_geotag_calls(self, count: usize) -> Self {
        self.with_state(|s| s.geotag_calls_before_outage = Some(count))
    }

    pub fn unavailable(self) -> Self {
        self.with_state(|s| s.unavailable = true)
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.lock().calls.clone()
    }

    pub fn tags_of(&self, file: &str) -> TagValues {
        self.lock().tags.get(file).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(state: &MemoryState) -> Result<(), OracleError> {
        if state.unavailable {
            return Err(OracleError::Unavailable("memory oracle switched off".into()));
        }
        Ok(())
    }
}

impl MetadataOracle for MemoryOracle {
    fn read_tags(&self, files: &[PathBuf], tags: &[&str]) -> Result<TagMap, OracleError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        state.calls.push(OracleCall::ReadTags {
            files: names_of(files),
        });

        Ok(files
            .iter()
            .map(|file| {
                let values: TagValues = state
                    .tags
                    .get(&name_of(file))
                    .map(|all| {
                        all.iter()
                            .filter(|(tag, _)| tags.contains(&tag.as_str()))
                            .map(|(tag, value)| (tag.clone(), value.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                (file.clone(), values)
            })
            .collect())
    }

    fn apply_time_shift(
        &self,
        files: &[PathBuf],
        _shift: &TimeShift,
    ) -> Result<usize, OracleError> {
        let mut state = self.lock();
        Self::check_available(&state)?;
        let names = names_of(files);
        state.calls.push(OracleCall::TimeShift {
            files: names.clone(),
        });

        if let Some(bad) = names.iter().find(|n| state.time_shift_failures.contains(*n)) {
            return Err(OracleError::Failed(format!("cannot write {}", bad)));
        }
        Ok(names
            .iter()
            .filter(|n| {
                state
                    .tags
                    .get(*n)
                    .is_some_and(|t| t.contains_key(TAG_DATE_TIME_ORIGINAL))
            })
            .count())
    }

    fn apply_geotag(
        &self,
        files: &[PathBuf],
        request: &GeotagRequest,
    ) -> Result<usize, OracleError> {
        let mut state = self.lock();
        match state.geotag_calls_before_outage {
            Some(0) => state.unavailable = true,
            Some(n) => state.geotag_calls_before_outage = Some(n - 1),
            None => {}
        }
        Self::check_available(&state)?;
        let names = names_of(files);
        state.calls.push(OracleCall::Geotag {
            files: names.clone(),
            extrapolation: match request.mode {
                GeotagMode::Interpolate => None,
                GeotagMode::Extrapolate { window_secs } => Some(window_secs),
            },
        });

        if state.failing_geotag_calls > 0 {
            state.failing_geotag_calls -= 1;
            return Err(OracleError::Failed("simulated crash".into()));
        }

        let mut updated = 0;
        for name in names {
            let covered = state.interpolation_coverage.contains(&name)
                || (request.mode != GeotagMode::Interpolate
                    && state.extrapolation_coverage.contains(&name));
            if covered {
                state
                    .tags
                    .entry(name)
                    .or_default()
                    .insert(TAG_GPS_LATITUDE.to_string(), "48.8584".to_string());
                updated += 1;
            }
        }
        Ok(updated)
    }
}

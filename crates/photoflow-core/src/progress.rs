use std::path::Path;

/// Trait for reporting phase progress.
///
/// CLI implements with tracing/indicatif, tests use [`SilentReporter`].
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_scan_start(&self, _root: &Path) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_step_start(&self, _label: &str, _total: usize) {}
    fn on_step_progress(&self, _done: usize, _total: usize, _current: &Path) {}
    fn on_step_complete(&self, _label: &str, _duration_secs: f64) {}
    /// A file was skipped or could not be processed; the phase continues.
    fn on_file_warning(&self, _path: &Path, _message: &str) {}
    /// A dry-run step that would have touched the filesystem or the metadata tool.
    fn on_planned(&self, _action: &str, _path: &Path, _target: Option<&Path>) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

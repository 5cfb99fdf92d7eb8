use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use photoflow_core::ProgressReporter;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Scan: spinner (unknown total files upfront)
/// - Steps: progress bar (total known from the scan)
/// - Warnings and dry-run plans are printed above the bar
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.guard().take() {
            pb.finish_and_clear();
        }
    }

    /// Print a line without tearing the active bar.
    fn println(&self, line: String) {
        match self.guard().as_ref() {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS)
}

fn bar_style(label: &str) -> ProgressStyle {
    let template = format!(
        "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} files ({{eta}} remaining)",
        label
    );
    ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, root: &Path) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(spinner_style());
        pb.set_message(format!("Scanning {}...", root.display()));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_scan_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Scan complete: {} files in {:.2}s",
            "✓".green(),
            total_files,
            duration_secs
        );
    }

    fn on_step_start(&self, label: &str, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(bar_style(label));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_step_progress(&self, done: usize, total: usize, _current: &Path) {
        if let Some(pb) = self.guard().as_ref() {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(done as u64);
        }
    }

    fn on_step_complete(&self, label: &str, duration_secs: f64) {
        self.finish_bar();
        eprintln!("  {} {} complete in {:.2}s", "✓".green(), label, duration_secs);
    }

    fn on_file_warning(&self, path: &Path, message: &str) {
        self.println(format!(
            "  {} {}: {}",
            "!".yellow(),
            path.display(),
            message
        ));
    }

    fn on_planned(&self, action: &str, path: &Path, target: Option<&Path>) {
        let line = match target {
            Some(target) => format!(
                "  {} {} {} -> {}",
                "[dry-run]".cyan(),
                action,
                path.display(),
                target.display()
            ),
            None => format!("  {} {} {}", "[dry-run]".cyan(), action, path.display()),
        };
        self.println(line);
    }
}

use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::identity::ConflictGroup;
use crate::error::Error;
use crate::layout::Layout;

pub const DEDUP_SCRIPT_NAME: &str = "p01-dedup-action01-deduplicate_commands.sh";
pub const CONFLICT_REPORT_NAME: &str = "p01-dedup-report01-conflicting_versions.txt";
pub const RELOCATION_MANIFEST_NAME: &str = "p01-dedup-manifest01-relocated_duplicates.csv";

/// One duplicate and where it goes (or went).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMove {
    pub keeper: PathBuf,
    pub duplicate: PathBuf,
    pub destination: PathBuf,
    pub size: u64,
    pub checksum: String,
    /// Why the move did not happen; `None` when it was done (or planned).
    pub failure: Option<String>,
}

impl DuplicateMove {
    fn status(&self) -> &'static str {
        if self.failure.is_some() {
            "failed"
        } else {
            "moved"
        }
    }
}

#[derive(Debug, Serialize)]
struct ManifestRow<'a> {
    keeper: String,
    duplicate: String,
    destination: String,
    size: u64,
    checksum: &'a str,
    status: &'static str,
}

pub fn render_conflict_report(conflicts: &[ConflictGroup], layout: &Layout) -> String {
    let mut out = String::from("# Report on files with the same name but different checksums.\n\n");
    for conflict in conflicts {
        let _ = writeln!(
            out,
            "Filename: '{}' has {} instances with {} different versions:",
            conflict.name,
            conflict.members.len(),
            conflict.distinct_checksums.len()
        );
        for member in &conflict.members {
            let _ = writeln!(
                out,
                "  - Checksum: {}, Size: {}, Path: '{}'",
                member.checksum,
                member.size,
                layout.display_relative(&member.path)
            );
        }
        out.push('\n');
    }
    out
}

/// A bash script that performs (or replays) the moves, one block per kept file. Moves
/// that failed are kept as `# failed:` comments so the plan stays complete.
pub fn render_dedup_script(moves: &[DuplicateMove], layout: &Layout) -> String {
    let mut out = String::from("#!/bin/bash\n");
    out.push_str("# This script moves duplicate files into the duplicates directory.\n");
    out.push_str("# Kept file is listed as a comment before the 'mv' commands for its duplicates.\n");

    let mut current_keeper: Option<&Path> = None;
    for mv in moves {
        if current_keeper != Some(mv.keeper.as_path()) {
            let _ = write!(
                out,
                "\n# Duplicate set for: Size: {}, Checksum: {}\n# Keeping: '{}'\n",
                mv.size,
                mv.checksum,
                layout.display_relative(&mv.keeper)
            );
            current_keeper = Some(mv.keeper.as_path());
        }
        let destination = layout.display_relative(&mv.destination);
        let command = format!(
            "mv -n {} {}",
            shell_quote(&layout.display_relative(&mv.duplicate)),
            shell_quote(&destination)
        );
        if let Some(reason) = &mv.failure {
            let _ = writeln!(out, "# failed: {}  # {}", command, reason);
            continue;
        }
        if let Some(parent) = Path::new(&destination).parent() {
            let _ = writeln!(out, "mkdir -p {}", shell_quote(&parent.to_string_lossy()));
        }
        let _ = writeln!(out, "{}", command);
    }
    out
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Write `content` to `path`, or remove a stale `path` when there is nothing to report.
pub fn write_or_remove(path: &Path, content: Option<&str>) -> Result<bool, Error> {
    match content {
        Some(text) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, text)?;
            info!("Report written to: {}", path.display());
            Ok(true)
        }
        None => {
            if path.exists() {
                fs::remove_file(path)?;
            }
            Ok(false)
        }
    }
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}

pub fn write_relocation_manifest(
    path: &Path,
    moves: &[DuplicateMove],
    layout: &Layout,
) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for mv in moves {
        writer.serialize(ManifestRow {
            keeper: layout.display_relative(&mv.keeper),
            duplicate: layout.display_relative(&mv.duplicate),
            destination: layout.display_relative(&mv.destination),
            size: mv.size,
            checksum: &mv.checksum,
            status: mv.status(),
        })?;
    }
    writer.flush()?;
    info!("Relocation manifest written to: {}", path.display());
    Ok(())
}

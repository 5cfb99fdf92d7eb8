mod commands;
mod logging;
mod progress;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use photoflow_core::{AppConfig, ExifTool, GeotagOptions};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let args = Cli::parse();
    let _guard = logging::init_logger(&logging::LogSettings::from_cli(&args));

    if let Err(err) = run(args) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let config = photoflow_core::config::load_configuration()
        .context("Error loading configuration")?;

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return Ok(());
    };

    if args.dry_run {
        warn!("{}", "Dry run: nothing will be moved or rewritten.".yellow());
    }

    let reporter = CliReporter::new();
    let root = args.root.as_path();
    match command {
        Commands::Dedup => run_dedup(root, &config, args.dry_run, &reporter),
        Commands::Timeshift { offset } => {
            let exiftool = exiftool(&config)?;
            let summary = photoflow_core::run_timeshift(
                root,
                &config,
                &offset,
                args.dry_run,
                &exiftool,
                &reporter,
            )?;
            info!(
                "{} updated, {} without date tags, {} errors, {} backups moved to '{}'",
                format!("{}", summary.updated).green(),
                format!("{}", summary.no_tags).yellow(),
                format!("{}", summary.errors).red(),
                format!("{}", summary.originals_moved).cyan(),
                photoflow_core::layout::ORIGINALS_DIR,
            );
            if summary.dry_run {
                info!("{} files would be shifted by '{}'", summary.planned, offset);
            }
            Ok(())
        }
        Commands::PairJpegs => {
            let exiftool = exiftool(&config)?;
            let summary =
                photoflow_core::run_pair_jpegs(root, &config, args.dry_run, &exiftool, &reporter)?;
            info!(
                "{} RAW files, {} name pairs, {} verified, {} JPEGs moved, {} unverified, {} errors",
                summary.raw_files,
                format!("{}", summary.pairs_by_name).cyan(),
                format!("{}", summary.pairs_verified).green(),
                format!("{}", summary.jpegs_moved).green(),
                format!("{}", summary.unverified).yellow(),
                format!("{}", summary.errors).red(),
            );
            Ok(())
        }
        Commands::ByDate => {
            let exiftool = exiftool(&config)?;
            let summary =
                photoflow_core::run_by_date(root, &config, args.dry_run, &exiftool, &reporter)?;
            info!(
                "{} of {} files filed by date, {} undated, {} errors",
                format!("{}", summary.filed).green(),
                summary.candidates,
                format!("{}", summary.undated).yellow(),
                format!("{}", summary.errors).red(),
            );
            Ok(())
        }
        Commands::Geotag { gpx_dir, timezone } => {
            let exiftool = exiftool(&config)?;
            let options = GeotagOptions {
                gpx_dir,
                timezone,
                dry_run: args.dry_run,
            };
            let report =
                photoflow_core::run_geotag(root, &config, &options, &exiftool, &reporter)?;
            let summary = report.summary;
            if summary.reclaimed > 0 {
                warn!(
                    "{} files left in the holding area by an earlier run were put back first",
                    format!("{}", summary.reclaimed).yellow()
                );
            }
            if summary.dry_run {
                info!(
                    "{} files already geotagged, {} would be submitted for geotagging",
                    format!("{}", summary.already_tagged).cyan(),
                    format!("{}", summary.planned).green(),
                );
                return Ok(());
            }
            info!(
                "{} already tagged, {} tagged by interpolation, {} by extrapolation, {} untaggable",
                format!("{}", summary.already_tagged).cyan(),
                format!("{}", summary.tagged_pass1).green(),
                format!("{}", summary.tagged_pass2).green(),
                format!("{}", summary.untaggable).red(),
            );
            if summary.relocation_errors > 0 {
                warn!(
                    "{} files could not be moved between areas",
                    format!("{}", summary.relocation_errors).red()
                );
            }
            Ok(())
        }
        Commands::ToDevelop => {
            let report = photoflow_core::run_to_develop(root, &config, &reporter)?;
            print_folders(
                "Folders needing TIF/TIFF generation (RAW found, TIF/TIFF missing):",
                "No folders found needing TIF/TIFF generation.",
                &report.needs_tiff,
            );
            print_folders(
                "Folders needing Standard JPG generation (TIF/TIFF found, *__std.jpg missing):",
                "No folders found needing Standard JPG generation.",
                &report.needs_std_jpeg,
            );
            Ok(())
        }
        Commands::PrintConfig => {
            println!("Configuration file: {}", photoflow_core::config::config_path().display());
            println!("Configuration: {:#?}", config);
            Ok(())
        }
    }
}

/// The metadata tool must answer before any phase that depends on it starts.
fn exiftool(config: &AppConfig) -> Result<ExifTool> {
    let exiftool = ExifTool::new(&config.oracle.program);
    let version = exiftool.probe().with_context(|| {
        format!(
            "'{}' is not installed or not in PATH. Please install it to use this command",
            config.oracle.program
        )
    })?;
    info!("Using exiftool {}", version.trim());
    Ok(exiftool)
}

fn run_dedup(
    root: &Path,
    config: &AppConfig,
    dry_run: bool,
    reporter: &CliReporter,
) -> Result<()> {
    let summary = photoflow_core::run_dedup(root, config, dry_run, reporter)?;

    println!();
    info!(
        "{} files scanned, {} unreadable, {} entries skipped",
        format!("{}", summary.files_scanned).green(),
        format!("{}", summary.unreadable).yellow(),
        format!("{}", summary.skipped_entries).yellow(),
    );
    info!(
        "{} duplicate groups, {} duplicates, {} relocated, {} relocation errors",
        format!("{}", summary.duplicate_groups).red(),
        format!("{}", summary.duplicates_found).red(),
        format!("{}", summary.duplicates_relocated).cyan(),
        format!("{}", summary.relocation_errors).red(),
    );
    info!(
        "{} filenames with conflicting versions",
        format!("{}", summary.conflicts_found).yellow()
    );
    for path in [
        &summary.script_path,
        &summary.conflict_report_path,
        &summary.manifest_path,
    ]
    .into_iter()
    .flatten()
    {
        info!("Report: {}", path.display());
    }
    Ok(())
}

fn print_folders(heading: &str, empty: &str, folders: &BTreeSet<PathBuf>) {
    println!();
    if folders.is_empty() {
        println!("{}", empty.green());
        return;
    }
    println!("{}", heading.bold());
    for folder in folders {
        println!("  {}", folder.display());
    }
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "photoflow")]
#[command(about = "Batch workflow for organizing a photo collection", long_about = None)]
pub struct Cli {
    /// Root of the photo collection
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Report what would happen without moving or rewriting anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log at debug level (overrides TRACING_LEVEL)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log file (overrides LOG_FILE_PATH)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Move duplicate files into the duplicates directory and report name conflicts
    #[command(name = "01-dedup", alias = "dedup")]
    Dedup,

    /// Shift the date tags of every file by a fixed offset
    #[command(name = "02-timeshift", alias = "timeshift")]
    Timeshift {
        /// Offset such as '+=0:0:0 1:00:00' (Y:M:D H:M:S)
        #[arg(long, allow_hyphen_values = true)]
        offset: String,
    },

    /// Move the JPEG half of verified RAW+JPEG pairs aside
    #[command(name = "03-pair-jpegs", alias = "pair-jpegs")]
    PairJpegs,

    /// File photos into by-date/YYYY-MM-DD folders
    #[command(name = "04-by-date", alias = "by-date")]
    ByDate,

    /// Add GPS positions from GPX tracks
    #[command(name = "05-geotag", alias = "geotag")]
    Geotag {
        /// Directory containing the .gpx track files
        #[arg(long)]
        gpx_dir: PathBuf,

        /// Camera clock offset from UTC, e.g. '+02:00'
        #[arg(long, allow_hyphen_values = true)]
        timezone: String,
    },

    /// List folders that still need TIFF or standard JPEG development
    #[command(name = "06-to-develop", alias = "to-develop")]
    ToDevelop,

    /// Print configuration values
    PrintConfig,
}

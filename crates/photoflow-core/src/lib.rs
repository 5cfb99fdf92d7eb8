pub mod analysis;
pub mod config;
pub mod error;
pub mod hasher;
pub mod layout;
pub mod oracle;
pub mod phases;
pub mod progress;
pub mod relocate;
pub mod scanner;

pub use config::AppConfig;
pub use error::Error;
pub use layout::Layout;
pub use oracle::{ExifTool, MemoryOracle, MetadataOracle, OracleError};
pub use phases::by_date::{run_by_date, ByDateSummary};
pub use phases::dedup::{run_dedup, DedupSummary};
pub use phases::develop::{run_to_develop, DevelopReport};
pub use phases::geotag::{run_geotag, GeotagOptions, GeotagReport, GeotagState, GeotagSummary};
pub use phases::pairs::{run_pair_jpegs, PairSummary};
pub use phases::timeshift::{run_timeshift, TimeshiftSummary};
pub use progress::{ProgressReporter, SilentReporter};
pub use relocate::{Relocation, RelocationRequest, Relocator};

pub mod identity;
pub mod reports;

pub use identity::{
    build_file_records, find_duplicates_and_conflicts, ConflictGroup, FileRecord,
    IdentityAnalysis, IdentityGroup, IdentityKey, KeyMode,
};

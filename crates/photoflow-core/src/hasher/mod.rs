pub mod digest;

pub use digest::{checksum_file, try_checksum_file, ChecksumAlgorithm};

pub mod walk;

pub use walk::{resolve_path, PathClassifier, ScanOutcome};

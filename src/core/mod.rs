//! # Core Module
//!
//! The scan-and-deduplicate engine. Nothing in here prints; progress leaves
//! through `events` and results through return values.
//!
//! ## Modules
//! - `scanner` - Discovers candidate files under a root
//! - `hasher` - Content and perceptual fingerprints, computed on a worker pool
//! - `store` - SQLite persistence for file records and lock rows
//! - `comparator` - Classifies duplicates and clusters near-duplicates
//! - `lock` - Named lease locks shared across processes
//! - `metadata` - Optional EXIF enrichment and place resolution
//! - `pipeline` - Orchestrates a scan run

pub mod comparator;
pub mod hasher;
pub mod lock;
pub mod metadata;
pub mod pipeline;
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use comparator::{Classification, ClassifyOutcome, DuplicateClassifier, NearDuplicateCluster};
pub use hasher::{ContentHash, Fingerprint, PerceptualHash};
pub use lock::{DatabaseLock, LeaseChecker, LockGuard, LockName};
pub use pipeline::{FileDisposition, Pipeline, ScanReport};
pub use scanner::CandidateFile;
pub use store::{FileRecord, Store};

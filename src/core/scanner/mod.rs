//! # Scanner Module
//!
//! Discovers candidate files under a root directory.
//!
//! Discovery is read-only and lazy: [`WalkDirScanner::candidates`] returns an
//! iterator that stats entries as it goes. Every call starts a fresh walk.
//! Traversal order is not part of the contract.
//!
//! ## Example
//! ```rust,ignore
//! use media_dedup::core::scanner::{ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig {
//!     extensions: vec!["jpg".into(), "png".into()],
//!     min_size: Some(1024),
//!     ..Default::default()
//! });
//! for candidate in scanner.candidates("/mnt/photos".as_ref())? {
//!     println!("{} ({} bytes)", candidate.path.display(), candidate.size);
//! }
//! ```

mod filter;
mod walker;

pub use filter::CandidateFilter;
pub use walker::{Candidates, ScanConfig, WalkDirScanner};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A file selected for fingerprinting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFile {
    /// Absolute path
    pub path: PathBuf,
    /// Size in bytes at discovery time
    pub size: u64,
}

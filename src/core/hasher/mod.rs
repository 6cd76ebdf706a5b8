//! # Hasher Module
//!
//! Fingerprints candidate files.
//!
//! ## Fingerprint
//! - **Content hash** - BLAKE3 over the full byte stream, truncated to 128
//!   bits. Read in fixed chunks, so memory use is independent of file size.
//! - **Perceptual hash** - 64-bit mean hash, only for decodable raster images.
//!   A decode failure leaves it empty and is not an error.
//! - **Media type** - magic-byte detection.
//!
//! Fingerprinting has no side effects and is safe to run from any thread.
//! [`HashPool`] runs it on a bounded set of workers.
//!
//! ## Example
//! ```rust,ignore
//! use media_dedup::core::hasher::{FileHasher, Fingerprinter, HashPool};
//!
//! let pool = HashPool::new(4)?;
//! pool.run(candidates, &Fingerprinter::new(), |result| {
//!     println!("{}: {:?}", result.path.display(), result.outcome);
//!     Ok::<(), ()>(())
//! })?;
//! ```

mod content;
mod media;
mod perceptual;
mod pool;

pub use content::{hash_file, ContentHash, CHUNK_SIZE};
pub use media::{is_image, media_category, detect_media_type};
pub use perceptual::{hamming_distance, PerceptualHash, PerceptualHasher, HASH_BITS};
pub use pool::HashPool;

use crate::core::scanner::CandidateFile;
use crate::error::HashError;
use std::path::PathBuf;

/// Hashes of one successfully read file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub content_hash: ContentHash,
    pub perceptual_hash: Option<PerceptualHash>,
    pub media_type: Option<String>,
}

/// Outcome of fingerprinting one candidate. Exactly one per candidate.
#[derive(Debug)]
pub struct FingerprintResult {
    pub path: PathBuf,
    pub size: u64,
    /// `Err` when the file could not be read; no hashes are available then
    pub outcome: Result<Fingerprint, HashError>,
}

impl FingerprintResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Computes a fingerprint for a candidate file
pub trait FileHasher: Send + Sync {
    fn fingerprint(&self, candidate: &CandidateFile) -> FingerprintResult;
}

/// Default hasher: content hash, media type, then perceptual hash for images
pub struct Fingerprinter {
    perceptual: PerceptualHasher,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self {
            perceptual: PerceptualHasher::new(),
        }
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileHasher for Fingerprinter {
    fn fingerprint(&self, candidate: &CandidateFile) -> FingerprintResult {
        let path = &candidate.path;

        let outcome = hash_file(path)
            .map_err(|source| HashError::Io {
                path: path.clone(),
                source,
            })
            .map(|content_hash| {
                let media_type = detect_media_type(path);
                let perceptual_hash = if is_image(media_type.as_deref()) {
                    self.perceptual.hash_file(path)
                } else {
                    None
                };
                Fingerprint {
                    content_hash,
                    perceptual_hash,
                    media_type,
                }
            });

        FingerprintResult {
            path: path.clone(),
            size: candidate.size,
            outcome,
        }
    }
}

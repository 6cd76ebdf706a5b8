//! # Comparator Module
//!
//! Decides which files are duplicates.
//!
//! ## How It Works
//! - **Exact duplicates** are decided per file as results arrive, by the
//!   [`DuplicateClassifier`], and persisted immediately.
//! - **Near duplicates** are computed on demand over every stored perceptual
//!   hash, by greedy seed clustering on Hamming distance.
//!
//! ## Comparison Thresholds
//! | Distance | Meaning            |
//! |----------|--------------------|
//! | 0        | Same picture       |
//! | 1-5      | Near duplicate     |
//! | 6+       | Probably different |

mod classifier;
mod grouper;

pub use classifier::{Classification, ClassifyOutcome, DuplicateClassifier};
pub use grouper::{cluster_by_hamming, cluster_by_hamming_with};

use crate::core::hasher::PerceptualHash;
use crate::core::lock::LeaseChecker;
use crate::core::store::{FileRecord, Store};
use crate::error::{DedupError, StoreError};
use serde::Serialize;

/// A near-duplicate cluster with its records, seed first
#[derive(Debug, Clone, Serialize)]
pub struct NearDuplicateCluster {
    pub members: Vec<FileRecord>,
}

/// Parse stored hashes. Records whose stored value is not a valid hash are
/// logged and left out.
pub fn parse_hashed_records(rows: Vec<(i64, String)>) -> Vec<(i64, PerceptualHash)> {
    rows.into_iter()
        .filter_map(|(id, raw)| match PerceptualHash::from_hex(&raw) {
            Ok(hash) => Some((id, hash)),
            Err(e) => {
                tracing::warn!("Skipping record {} in clustering: {}", id, e);
                None
            }
        })
        .collect()
}

/// Cluster every stored perceptual hash.
///
/// With a lease checker, the scan lock is re-checked before each new cluster
/// and clustering stops if a writer shows up.
pub fn near_duplicate_clusters(
    store: &Store,
    threshold: u32,
    checker: Option<&mut LeaseChecker<'_>>,
) -> Result<Vec<Vec<i64>>, DedupError> {
    let entries = parse_hashed_records(store.hashed_records()?);
    tracing::debug!(
        "Clustering {} perceptual hashes at threshold {}",
        entries.len(),
        threshold
    );

    match checker {
        Some(checker) => Ok(cluster_by_hamming_with(&entries, threshold, || {
            checker.periodic_check()
        })?),
        None => Ok(cluster_by_hamming(&entries, threshold)),
    }
}

/// Load records for clusters with at least `min_members` ids
pub fn resolve_clusters(
    store: &Store,
    clusters: &[Vec<i64>],
    min_members: usize,
) -> Result<Vec<NearDuplicateCluster>, StoreError> {
    let mut resolved = Vec::new();
    for cluster in clusters.iter().filter(|c| c.len() >= min_members) {
        let mut members = Vec::with_capacity(cluster.len());
        for id in cluster {
            match store.get_file_by_id(*id)? {
                Some(record) => members.push(record),
                None => return Err(StoreError::NotFound { id: *id }),
            }
        }
        resolved.push(NearDuplicateCluster { members });
    }
    Ok(resolved)
}

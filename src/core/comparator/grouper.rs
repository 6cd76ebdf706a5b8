//! Greedy seed clustering over perceptual hashes.
//!
//! Ids are visited in ascending order. Each unassigned id seeds a new cluster
//! and absorbs every later unassigned id within `threshold` bits of the seed.
//! Membership depends only on distance to the seed, never on distance between
//! members, so if A is near B and B is near C, C still lands elsewhere when it
//! is far from A.

use crate::core::hasher::PerceptualHash;
use std::convert::Infallible;

/// Partition `entries` into clusters of ids. Every id appears exactly once.
pub fn cluster_by_hamming(entries: &[(i64, PerceptualHash)], threshold: u32) -> Vec<Vec<i64>> {
    match cluster_by_hamming_with(entries, threshold, || Ok::<(), Infallible>(())) {
        Ok(clusters) => clusters,
        Err(never) => match never {},
    }
}

/// Like [`cluster_by_hamming`], calling `on_seed` before each new cluster is
/// opened. An error from `on_seed` stops clustering.
pub fn cluster_by_hamming_with<E>(
    entries: &[(i64, PerceptualHash)],
    threshold: u32,
    mut on_seed: impl FnMut() -> Result<(), E>,
) -> Result<Vec<Vec<i64>>, E> {
    let mut ordered = entries.to_vec();
    ordered.sort_by_key(|(id, _)| *id);

    let mut assigned = vec![false; ordered.len()];
    let mut clusters = Vec::new();

    for i in 0..ordered.len() {
        if assigned[i] {
            continue;
        }
        on_seed()?;

        let (seed_id, seed_hash) = ordered[i];
        assigned[i] = true;
        let mut cluster = vec![seed_id];

        for j in (i + 1)..ordered.len() {
            if assigned[j] {
                continue;
            }
            let (id, hash) = ordered[j];
            if seed_hash.distance(&hash) <= threshold {
                assigned[j] = true;
                cluster.push(id);
            }
        }

        clusters.push(cluster);
    }

    Ok(clusters)
}

//! Integration tests for near-duplicate clustering over stored hashes.

use media_dedup::core::comparator::{
    cluster_by_hamming, near_duplicate_clusters, resolve_clusters,
};
use media_dedup::core::hasher::{hamming_distance, PerceptualHash};
use media_dedup::core::lock::{DatabaseLock, HolderIdentity, LeaseChecker, LockName};
use media_dedup::core::store::{NewFileRecord, Store};
use media_dedup::error::{DedupError, LockAcquisitionError};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn insert(store: &Store, name: &str, phash: &str) -> i64 {
    store
        .insert_file(&NewFileRecord {
            path: PathBuf::from(format!("/photos/{name}")),
            content_hash: format!("{name:0>32}"),
            perceptual_hash: Some(phash.to_string()),
            is_duplicate: false,
            duplicate_of_id: None,
            size: 1024,
            media_type: Some("image/jpeg".into()),
        })
        .unwrap()
}

#[test]
fn opposite_hashes_stay_apart() {
    let zeros = "0".repeat(16);
    let ones = "f".repeat(16);
    assert_eq!(hamming_distance(&zeros, &ones), 64);

    let entries = vec![
        (1, PerceptualHash::from_hex(&zeros).unwrap()),
        (2, PerceptualHash::from_hex(&ones).unwrap()),
    ];
    assert_eq!(cluster_by_hamming(&entries, 5), vec![vec![1], vec![2]]);
}

#[test]
fn tighter_threshold_refines_separated_groups() {
    let store = Store::open_in_memory().unwrap();
    // Two families far apart, each with members 1 and 4 bits from its seed
    let a = insert(&store, "a", "0000000000000000");
    let a1 = insert(&store, "a1", "0000000000000001");
    let a4 = insert(&store, "a4", "000000000000000f");
    let b = insert(&store, "b", "ffffffffffffffff");
    let b1 = insert(&store, "b1", "fffffffffffffffe");
    let b4 = insert(&store, "b4", "fffffffffffffff0");

    let loose = near_duplicate_clusters(&store, 10, None).unwrap();
    assert_eq!(loose, vec![vec![a, a1, a4], vec![b, b1, b4]]);

    let tight = near_duplicate_clusters(&store, 2, None).unwrap();
    assert_eq!(tight, vec![vec![a, a1], vec![a4], vec![b, b1], vec![b4]]);

    for cluster in &tight {
        assert!(loose
            .iter()
            .any(|outer| cluster.iter().all(|id| outer.contains(id))));
    }
}

#[test]
fn membership_is_measured_from_the_seed_only() {
    let store = Store::open_in_memory().unwrap();
    // Chain: seed-mid is 4 bits, mid-far is 4 bits, seed-far is 8 bits
    let seed = insert(&store, "seed", "0000000000000000");
    let mid = insert(&store, "mid", "000000000000000f");
    let far = insert(&store, "far", "00000000000000ff");

    let clusters = near_duplicate_clusters(&store, 5, None).unwrap();
    assert_eq!(clusters, vec![vec![seed, mid], vec![far]]);
}

#[test]
fn corrupt_stored_hash_is_left_out() {
    let store = Store::open_in_memory().unwrap();
    let good = insert(&store, "good", "00000000000000ff");
    insert(&store, "bad", "not-a-hash");

    let clusters = near_duplicate_clusters(&store, 5, None).unwrap();
    assert_eq!(clusters, vec![vec![good]]);
}

#[test]
fn resolved_clusters_drop_singletons() {
    let store = Store::open_in_memory().unwrap();
    insert(&store, "x", "0000000000000000");
    insert(&store, "y", "0000000000000003");
    insert(&store, "z", "ffffffffffffffff");

    let ids = near_duplicate_clusters(&store, 5, None).unwrap();
    let clusters = resolve_clusters(&store, &ids, 2).unwrap();

    assert_eq!(clusters.len(), 1);
    let names: Vec<_> = clusters[0]
        .members
        .iter()
        .map(|r| r.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["x", "y"]);
}

#[test]
fn clustering_refuses_to_start_under_a_scan_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dedup.db");
    let writer = Store::open(&path).unwrap();
    let reader = Store::open(&path).unwrap();
    insert(&writer, "x", "0000000000000000");

    let _scan = DatabaseLock::new(&writer, LockName::Scan, Duration::from_secs(60))
        .with_holder(HolderIdentity {
            process_id: 31337,
            hostname: "scanner".into(),
        })
        .acquire()
        .unwrap();

    let mut checker = LeaseChecker::new(&reader, LockName::Scan, Duration::ZERO);
    let err = checker.check_at_start().unwrap_err();
    assert_eq!(err.holder_pid(), Some(31337));

    let err = near_duplicate_clusters(&reader, 5, Some(&mut checker)).unwrap_err();
    assert!(matches!(
        err,
        DedupError::Lock(LockAcquisitionError::AppearedDuringRun { .. })
    ));
}

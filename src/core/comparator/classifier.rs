//! Exact-duplicate classification against previously stored records.
//!
//! Matching order for a fingerprinted file:
//! 1. same content hash as an existing record
//! 2. otherwise, exactly the same perceptual hash
//! 3. otherwise it is an original
//!
//! A match always points at the lowest id among the matching records. Chains
//! are not followed, so linkage is direct and not transitively closed.

use crate::core::hasher::Fingerprint;
use crate::core::store::{FileRecord, NewFileRecord, Store};
use crate::error::StoreError;
use std::path::Path;

/// What the classifier did with the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyOutcome {
    /// First sighting of this path
    Inserted,
    /// Known path whose hashes or duplicate status changed
    Updated,
    /// Known path, same classification as before (timestamp refreshed)
    Unchanged,
}

/// Result of classifying one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub id: i64,
    pub duplicate_of_id: Option<i64>,
    pub outcome: ClassifyOutcome,
}

impl Classification {
    pub fn is_duplicate(&self) -> bool {
        self.duplicate_of_id.is_some()
    }
}

/// Decides and persists one `FileRecord` per fingerprinted file
pub struct DuplicateClassifier<'s> {
    store: &'s Store,
}

impl<'s> DuplicateClassifier<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn classify(
        &self,
        path: &Path,
        size: u64,
        fingerprint: &Fingerprint,
    ) -> Result<Classification, StoreError> {
        let content_hash = fingerprint.content_hash.to_hex();
        let perceptual_hash = fingerprint.perceptual_hash.map(|h| h.to_hex());

        let duplicate_of_id = self.find_original(&content_hash, perceptual_hash.as_deref(), None)?;
        let mut record = NewFileRecord {
            path: path.to_path_buf(),
            content_hash,
            perceptual_hash,
            is_duplicate: duplicate_of_id.is_some(),
            duplicate_of_id,
            size,
            media_type: fingerprint.media_type.clone(),
        };

        match self.store.insert_file(&record) {
            Ok(id) => {
                if let Some(original) = duplicate_of_id {
                    tracing::debug!("{} duplicates record {}", path.display(), original);
                }
                Ok(Classification {
                    id,
                    duplicate_of_id,
                    outcome: ClassifyOutcome::Inserted,
                })
            }
            Err(e) if e.is_constraint_violation() => {
                let existing = match self.store.get_file_by_path(path)? {
                    Some(existing) => existing,
                    None => return Err(e),
                };
                self.reclassify(existing, &mut record)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-mark a known path against records older than itself
    fn reclassify(
        &self,
        existing: FileRecord,
        record: &mut NewFileRecord,
    ) -> Result<Classification, StoreError> {
        let duplicate_of_id = self.find_original(
            &record.content_hash,
            record.perceptual_hash.as_deref(),
            Some(existing.id),
        )?;
        record.is_duplicate = duplicate_of_id.is_some();
        record.duplicate_of_id = duplicate_of_id;

        let changed = existing.content_hash != record.content_hash
            || existing.perceptual_hash != record.perceptual_hash
            || existing.is_duplicate != record.is_duplicate
            || existing.duplicate_of_id != record.duplicate_of_id;

        self.store.update_classification(existing.id, record)?;

        let outcome = if changed {
            tracing::debug!(
                "Reclassified {} (duplicate_of {:?} -> {:?})",
                record.path.display(),
                existing.duplicate_of_id,
                duplicate_of_id
            );
            ClassifyOutcome::Updated
        } else {
            ClassifyOutcome::Unchanged
        };

        Ok(Classification {
            id: existing.id,
            duplicate_of_id,
            outcome,
        })
    }

    /// Lowest-id earlier record matching by content hash, else by exact
    /// perceptual hash. With `own_id` set, only records older than it count.
    fn find_original(
        &self,
        content_hash: &str,
        perceptual_hash: Option<&str>,
        own_id: Option<i64>,
    ) -> Result<Option<i64>, StoreError> {
        let older = |id: &i64| own_id.map_or(true, |own| *id < own);

        if let Some(id) = self
            .store
            .earliest_by_content_hash(content_hash, own_id)?
            .filter(older)
        {
            return Ok(Some(id));
        }

        match perceptual_hash {
            Some(hash) => Ok(self
                .store
                .earliest_by_perceptual_hash(hash, own_id)?
                .filter(older)),
            None => Ok(None),
        }
    }
}

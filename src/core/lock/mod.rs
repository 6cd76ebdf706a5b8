//! # Lock Module
//!
//! Lease-based mutual exclusion between independent invocations that share a
//! store.
//!
//! A lock is a row in the `locks` table keyed by a unique lock name. Holding
//! the row means holding the lock. Every row carries an expiry, so a crashed
//! holder cannot wedge the system: the next acquire after expiry deletes the
//! stale row and takes over.
//!
//! ## States
//! - `Unlocked` - no row
//! - `Locked` - row present and not expired
//! - `Locked(reclaimed)` - an expired row was deleted and replaced
//!
//! ## Example
//! ```rust,ignore
//! use media_dedup::core::lock::{DatabaseLock, LockName};
//!
//! let guard = DatabaseLock::new(&store, LockName::Scan, timeout).acquire()?;
//! // ... mutate the store ...
//! guard.release()?;
//! ```

mod checker;

pub use checker::LeaseChecker;

use crate::core::store::{now, LockRecord, Store};
use crate::error::{LockAcquisitionError, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Well-known lock names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockName {
    /// Held for the whole scan-and-persist run
    Scan,
    /// Held while moving duplicates out of the collection
    Deduplicate,
    /// Held while deleting moved duplicates
    Purge,
}

impl LockName {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockName::Scan => "scan",
            LockName::Deduplicate => "deduplicate",
            LockName::Purge => "purge",
        }
    }
}

impl AsRef<str> for LockName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(LockName::Scan),
            "deduplicate" => Ok(LockName::Deduplicate),
            "purge" => Ok(LockName::Purge),
            other => Err(format!("unknown lock name '{}'", other)),
        }
    }
}

/// Who holds a lock: process id plus host name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderIdentity {
    pub process_id: u32,
    pub hostname: String,
}

impl HolderIdentity {
    /// Identity of the running process
    pub fn current() -> Self {
        Self {
            process_id: std::process::id(),
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }
}

impl fmt::Display for HolderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID {} on {}", self.process_id, self.hostname)
    }
}

/// Poll settings for a lock that waits instead of failing immediately
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

/// A named lease lock in a store
pub struct DatabaseLock<'s> {
    store: &'s Store,
    lock_name: String,
    timeout: Duration,
    holder: HolderIdentity,
    wait: Option<WaitPolicy>,
}

impl<'s> DatabaseLock<'s> {
    /// Lock `lock_name` for at most `timeout` per lease
    pub fn new(store: &'s Store, lock_name: impl AsRef<str>, timeout: Duration) -> Self {
        Self {
            store,
            lock_name: lock_name.as_ref().to_string(),
            timeout,
            holder: HolderIdentity::current(),
            wait: None,
        }
    }

    /// Poll for a held lock until `policy.timeout` instead of failing
    pub fn waiting(mut self, policy: WaitPolicy) -> Self {
        self.wait = Some(policy);
        self
    }

    /// Acquire on behalf of a different holder
    pub fn with_holder(mut self, holder: HolderIdentity) -> Self {
        self.holder = holder;
        self
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    /// Take the lock.
    ///
    /// An expired row is deleted and the acquisition retried. A live row
    /// fails with [`LockAcquisitionError::Held`], or is polled when waiting.
    /// Losing an insert race fails with [`LockAcquisitionError::LostRace`]
    /// naming the winner.
    pub fn acquire(self) -> Result<LockGuard<'s>, LockAcquisitionError> {
        let deadline = self.wait.map(|w| Instant::now() + w.timeout);
        let mut announced_wait = false;

        loop {
            let at = now();

            if let Some(existing) = self.store.get_lock(&self.lock_name)? {
                if existing.is_expired(at) {
                    tracing::warn!(
                        "Reclaiming expired lock '{}' from PID {} on {} (expired {:?})",
                        self.lock_name,
                        existing.holder_process,
                        existing.holder_host,
                        existing.expires_at
                    );
                    self.store.delete_lock(existing.id)?;
                    continue;
                }

                match (self.wait, deadline) {
                    (Some(policy), Some(deadline)) if Instant::now() < deadline => {
                        if !announced_wait {
                            tracing::info!(
                                "Lock '{}' held by PID {} on {}, waiting for lock",
                                self.lock_name,
                                existing.holder_process,
                                existing.holder_host
                            );
                            announced_wait = true;
                        }
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        std::thread::sleep(policy.poll_interval.min(remaining));
                        continue;
                    }
                    (Some(_), _) => {
                        return Err(LockAcquisitionError::WaitTimeout {
                            lock_name: self.lock_name.clone(),
                            process_id: existing.holder_process,
                            hostname: existing.holder_host,
                        })
                    }
                    (None, _) => {
                        return Err(LockAcquisitionError::Held {
                            lock_name: self.lock_name.clone(),
                            process_id: existing.holder_process,
                            hostname: existing.holder_host,
                            acquired_at: existing.acquired_at,
                        })
                    }
                }
            }

            let expires_at = chrono::Duration::from_std(self.timeout)
                .ok()
                .and_then(|lease| at.checked_add_signed(lease));

            match self.store.insert_lock(
                &self.lock_name,
                self.holder.process_id,
                &self.holder.hostname,
                at,
                expires_at,
            ) {
                Ok(record) => {
                    tracing::info!(
                        "Acquired lock '{}' ({}) until {:?}",
                        self.lock_name,
                        self.holder,
                        record.expires_at
                    );
                    return Ok(LockGuard {
                        store: self.store,
                        record,
                        released: false,
                    });
                }
                Err(e) if e.is_constraint_violation() => {
                    match self.store.get_lock(&self.lock_name)? {
                        Some(winner) => {
                            return Err(LockAcquisitionError::LostRace {
                                lock_name: self.lock_name.clone(),
                                process_id: winner.holder_process,
                                hostname: winner.holder_host,
                                acquired_at: winner.acquired_at,
                            })
                        }
                        // Winner already released; try again.
                        None => continue,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// A held lock. Released explicitly with [`LockGuard::release`] or on drop.
pub struct LockGuard<'s> {
    store: &'s Store,
    record: LockRecord,
    released: bool,
}

impl LockGuard<'_> {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Delete our row. A row that is already gone is not an error.
    pub fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        self.delete_row()
    }

    fn delete_row(&self) -> Result<(), StoreError> {
        let removed = self.store.delete_lock(self.record.id)?;
        if removed == 0 {
            tracing::debug!(
                "Lock '{}' row was already gone at release",
                self.record.lock_name
            );
        } else {
            tracing::info!("Released lock '{}'", self.record.lock_name);
        }
        Ok(())
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.delete_row() {
            tracing::error!("Failed to release lock '{}': {}", self.record.lock_name, e);
        }
    }
}

/// Delete every expired lock row. Returns how many were removed.
pub fn cleanup_expired_locks(store: &Store) -> Result<usize, StoreError> {
    let at = now();
    let mut removed = 0;
    for lock in store.list_locks()? {
        if lock.is_expired(at) {
            tracing::info!(
                "Removing expired lock '{}' held by PID {} on {}",
                lock.lock_name,
                lock.holder_process,
                lock.holder_host
            );
            removed += store.delete_lock(lock.id)?;
        }
    }
    Ok(removed)
}

/// The live lock row for `lock_name`, if any. An expired row is deleted and
/// reported as absent.
pub fn check_lock_exists(store: &Store, lock_name: &str) -> Result<Option<LockRecord>, StoreError> {
    match store.get_lock(lock_name)? {
        Some(lock) if lock.is_expired(now()) => {
            tracing::info!("Cleaning up expired lock '{}'", lock_name);
            store.delete_lock(lock.id)?;
            Ok(None)
        }
        other => Ok(other),
    }
}

/// Every lock row, expired or not
pub fn list_locks(store: &Store) -> Result<Vec<LockRecord>, StoreError> {
    store.list_locks()
}

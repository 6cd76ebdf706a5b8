//! Read-only lease checker for dry-run style callers.
//!
//! The checker never takes a lock. It verifies nobody holds one when work
//! starts, then re-checks at an interval and aborts if a holder appears.

use super::check_lock_exists;
use crate::core::store::Store;
use crate::error::LockAcquisitionError;
use std::time::{Duration, Instant};

pub struct LeaseChecker<'s> {
    store: &'s Store,
    lock_name: String,
    interval: Duration,
    last_check: Option<Instant>,
}

impl<'s> LeaseChecker<'s> {
    pub fn new(store: &'s Store, lock_name: impl AsRef<str>, interval: Duration) -> Self {
        Self {
            store,
            lock_name: lock_name.as_ref().to_string(),
            interval,
            last_check: None,
        }
    }

    /// Fail if the lock is held right now
    pub fn check_at_start(&mut self) -> Result<(), LockAcquisitionError> {
        self.last_check = Some(Instant::now());
        match check_lock_exists(self.store, &self.lock_name)? {
            Some(lock) => Err(LockAcquisitionError::Held {
                lock_name: self.lock_name.clone(),
                process_id: lock.holder_process,
                hostname: lock.holder_host,
                acquired_at: lock.acquired_at,
            }),
            None => Ok(()),
        }
    }

    /// Re-check once `interval` has passed since the previous check.
    ///
    /// Cheap to call in a hot loop; it only touches the store when due.
    pub fn periodic_check(&mut self) -> Result<(), LockAcquisitionError> {
        let due = self
            .last_check
            .map_or(true, |last| last.elapsed() >= self.interval);
        if !due {
            return Ok(());
        }
        self.last_check = Some(Instant::now());

        match check_lock_exists(self.store, &self.lock_name)? {
            Some(lock) => {
                tracing::error!(
                    "Lock '{}' appeared during read-only run (PID {} on {})",
                    self.lock_name,
                    lock.holder_process,
                    lock.holder_host
                );
                Err(LockAcquisitionError::AppearedDuringRun {
                    lock_name: self.lock_name.clone(),
                    process_id: lock.holder_process,
                    hostname: lock.holder_host,
                })
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::now;

    #[test]
    fn start_check_passes_without_lock() {
        let store = Store::open_in_memory().unwrap();
        let mut checker = LeaseChecker::new(&store, "scan", Duration::from_secs(60));
        assert!(checker.check_at_start().is_ok());
    }

    #[test]
    fn start_check_fails_when_held() {
        let store = Store::open_in_memory().unwrap();
        store.insert_lock("scan", 77, "nas", now(), None).unwrap();

        let mut checker = LeaseChecker::new(&store, "scan", Duration::from_secs(60));
        let err = checker.check_at_start().unwrap_err();
        assert_eq!(err.holder_pid(), Some(77));
    }

    #[test]
    fn periodic_check_respects_interval() {
        let store = Store::open_in_memory().unwrap();
        let mut checker = LeaseChecker::new(&store, "scan", Duration::from_secs(3600));
        checker.check_at_start().unwrap();

        store.insert_lock("scan", 5, "nas", now(), None).unwrap();

        // Not due yet, so the new row goes unnoticed.
        assert!(checker.periodic_check().is_ok());
    }

    #[test]
    fn periodic_check_detects_new_lock() {
        let store = Store::open_in_memory().unwrap();
        let mut checker = LeaseChecker::new(&store, "scan", Duration::ZERO);
        checker.check_at_start().unwrap();

        store.insert_lock("scan", 5, "nas", now(), None).unwrap();

        let err = checker.periodic_check().unwrap_err();
        assert!(matches!(
            err,
            LockAcquisitionError::AppearedDuringRun { process_id: 5, .. }
        ));
    }
}

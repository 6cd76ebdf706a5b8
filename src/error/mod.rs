//! # Error Module
//!
//! Error types for the scan-and-deduplicate pipeline.
//!
//! ## Taxonomy
//! - **Transient-Skip** - a single file could not be read or hashed. The file
//!   is logged and dropped, the run continues (`HashError`,
//!   `EnrichError::Failed`).
//! - **Fatal-Abort** - enrichment could not resolve required metadata, or the
//!   store failed. The run stops immediately (`EnrichError::is_fatal`,
//!   `StoreError`).
//! - **Contention** - another holder owns the lock. Terminates like a fatal
//!   error but names the competing holder (`LockAcquisitionError`).

use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum DedupError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Lock(#[from] LockAcquisitionError),

    #[error("Enrichment failed: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker pool error: {0}")]
    Pool(String),
}

impl DedupError {
    /// Process exit code for this error.
    ///
    /// `2` for configuration problems, `1` for everything else (including
    /// lock contention and enrichment failure).
    pub fn exit_code(&self) -> i32 {
        match self {
            DedupError::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Errors that occur while discovering candidate files
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

/// Errors that occur while fingerprinting a single file
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid perceptual hash '{value}': expected 16 hex digits")]
    InvalidPerceptualHash { value: String },
}

/// Errors from the persistent store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Record {id} not found")]
    NotFound { id: i64 },
}

impl StoreError {
    /// A UNIQUE (or other constraint) violation on insert
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Query(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// Raised when a named lock cannot be acquired, or when a read-only caller
/// detects that a lock is held.
#[derive(Error, Debug)]
pub enum LockAcquisitionError {
    #[error("Lock '{lock_name}' is held by PID {process_id} on {hostname} (acquired at {acquired_at})")]
    Held {
        lock_name: String,
        process_id: u32,
        hostname: String,
        acquired_at: NaiveDateTime,
    },

    #[error("Lock '{lock_name}' was acquired by another process: PID {process_id} on {hostname} (acquired at {acquired_at})")]
    LostRace {
        lock_name: String,
        process_id: u32,
        hostname: String,
        acquired_at: NaiveDateTime,
    },

    #[error("Timeout waiting for lock '{lock_name}' (held by PID {process_id} on {hostname})")]
    WaitTimeout {
        lock_name: String,
        process_id: u32,
        hostname: String,
    },

    #[error("Lock '{lock_name}' was acquired by PID {process_id} on {hostname} during a read-only run. Aborting.")]
    AppearedDuringRun {
        lock_name: String,
        process_id: u32,
        hostname: String,
    },

    #[error("Lock store failure: {0}")]
    Store(#[from] StoreError),
}

impl LockAcquisitionError {
    /// Process id of the competing holder, when one is known
    pub fn holder_pid(&self) -> Option<u32> {
        match self {
            Self::Held { process_id, .. }
            | Self::LostRace { process_id, .. }
            | Self::WaitTimeout { process_id, .. }
            | Self::AppearedDuringRun { process_id, .. } => Some(*process_id),
            Self::Store(_) => None,
        }
    }
}

/// Errors from the enrichment collaborator
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("GPS position {latitude:.5},{longitude:.5} of {path} could not be resolved to a place name")]
    Unresolvable {
        path: PathBuf,
        latitude: f64,
        longitude: f64,
    },

    #[error("Failed to load gazetteer {path}: {reason}")]
    Gazetteer { path: PathBuf, reason: String },

    /// The file itself could not be read (vanished, permission denied)
    #[error("Enrichment of {path} failed: {reason}")]
    Failed { path: PathBuf, reason: String },
}

impl EnrichError {
    /// Whether the run must stop. A file-local read failure only skips
    /// enrichment of that file.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Errors in configuration files or command-line settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DedupError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn acquired() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn held_lock_names_holder() {
        let error = LockAcquisitionError::Held {
            lock_name: "purge".to_string(),
            process_id: 4242,
            hostname: "nas-01".to_string(),
            acquired_at: acquired(),
        };
        let message = error.to_string();
        assert!(message.contains("purge"));
        assert!(message.contains("4242"));
        assert!(message.contains("nas-01"));
        assert!(message.contains("2024-05-01"));
        assert_eq!(error.holder_pid(), Some(4242));
    }

    #[test]
    fn hash_error_includes_path() {
        let error = HashError::Io {
            path: PathBuf::from("/photos/gone.jpg"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "vanished"),
        };
        let message = error.to_string();
        assert!(message.contains("/photos/gone.jpg"));
        assert!(message.contains("vanished"));
    }

    #[test]
    fn config_errors_exit_with_two() {
        let error = DedupError::from(ConfigError::Invalid("workers must be > 0".into()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn contention_and_enrichment_exit_with_one() {
        let lock = DedupError::from(LockAcquisitionError::WaitTimeout {
            lock_name: "scan".into(),
            process_id: 1,
            hostname: "h".into(),
        });
        let enrich = DedupError::from(EnrichError::Unresolvable {
            path: PathBuf::from("/a.jpg"),
            latitude: 1.0,
            longitude: 2.0,
        });
        assert_eq!(lock.exit_code(), 1);
        assert_eq!(enrich.exit_code(), 1);
    }
}

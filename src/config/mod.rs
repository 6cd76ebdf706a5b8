//! # Config Module
//!
//! Explicit run configuration, constructed once and handed to the
//! orchestrator.
//!
//! Settings come from a JSON file (`--config PATH`, or `./config.json` when
//! present) and are then overridden by command-line flags.
//!
//! ```json
//! {
//!   "database": "/srv/media/dedup.db",
//!   "media_folders": ["/mnt/photos"],
//!   "workers": 8,
//!   "extensions": ["jpg", "png", "heic"],
//!   "lock": { "timeout_secs": 7200, "wait": true },
//!   "enrichment": { "enabled": true, "gazetteer": "/srv/media/places.json" }
//! }
//! ```

use crate::core::lock::LockName;
use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of fingerprint workers
pub const DEFAULT_WORKERS: usize = 4;

/// Default Hamming threshold for near-duplicate clustering
pub const DEFAULT_THRESHOLD: u32 = 5;

/// File name looked up in the working directory when no `--config` is given
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Complete run configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// SQLite database file
    pub database: PathBuf,
    /// Folders scanned when no folder argument is given
    pub media_folders: Vec<PathBuf>,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Extension allow-set (lowercase, without dot). Empty = everything.
    pub extensions: Vec<String>,
    /// Minimum file size in bytes
    pub min_size: Option<u64>,
    /// Maximum file size in bytes
    pub max_size: Option<u64>,
    /// Stop after this many candidates
    pub limit: Option<usize>,
    /// Number of fingerprint workers
    pub workers: usize,
    /// Hamming threshold for `duplicates`
    pub threshold: u32,
    /// Lock behaviour
    pub lock: LockSettings,
    /// Enrichment behaviour
    pub enrichment: EnrichmentSettings,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            media_folders: Vec::new(),
            recursive: true,
            extensions: Vec::new(),
            min_size: None,
            max_size: None,
            limit: None,
            workers: DEFAULT_WORKERS,
            threshold: DEFAULT_THRESHOLD,
            lock: LockSettings::default(),
            enrichment: EnrichmentSettings::default(),
        }
    }
}

/// Lease lock settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Lease length; an unreleased lock is reclaimable after this long
    pub timeout_secs: u64,
    /// Poll for a held lock instead of failing immediately
    pub wait: bool,
    /// Give up waiting after this long
    pub wait_timeout_secs: u64,
    /// Delay between polls while waiting
    pub poll_interval_secs: u64,
    /// Re-check interval for read-only lease checkers
    pub check_interval_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 3600,
            wait: false,
            wait_timeout_secs: 60,
            poll_interval_secs: 2,
            check_interval_secs: 60,
        }
    }
}

impl LockSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Lease length for a given lock. Purge runs are long, so they get at
    /// least two hours.
    pub fn timeout_for(&self, name: LockName) -> Duration {
        match name {
            LockName::Purge => Duration::from_secs(self.timeout_secs.max(7200)),
            _ => self.timeout(),
        }
    }
}

/// Settings for the built-in EXIF enricher
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub enabled: bool,
    /// JSON list of `{ "name", "latitude", "longitude" }` places
    pub gazetteer: Option<PathBuf>,
    /// A GPS fix farther than this from every place is unresolvable
    pub max_distance_km: f64,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            gazetteer: None,
            max_distance_km: 25.0,
        }
    }
}

impl DedupConfig {
    /// Load a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse configuration from a JSON string
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        config.normalize();
        Ok(config)
    }

    /// Resolve the configuration for this invocation.
    ///
    /// An explicit path must exist; otherwise `./config.json` is used when
    /// present, and defaults when not.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                if local.is_file() {
                    tracing::debug!("Loading configuration from {}", local.display());
                    Self::from_file(&local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Lowercase extensions and strip leading dots
    fn normalize(&mut self) {
        self.extensions = self
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
    }

    /// Replace the extension allow-set from a comma-separated list
    pub fn set_extensions(&mut self, list: &str) {
        self.extensions = list.split(',').map(str::to_string).collect();
        self.normalize();
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.threshold > 64 {
            return Err(ConfigError::Invalid(format!(
                "threshold {} is out of range (0-64)",
                self.threshold
            )));
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "min-size {} is larger than max-size {}",
                    min, max
                )));
            }
        }
        if self.lock.timeout_secs == 0 {
            return Err(ConfigError::Invalid("lock timeout must be positive".into()));
        }
        if self.enrichment.enabled && self.enrichment.gazetteer.is_none() {
            return Err(ConfigError::Invalid(
                "enrichment requires a gazetteer file to resolve GPS positions".into(),
            ));
        }
        if self.enrichment.max_distance_km < 0.0 {
            return Err(ConfigError::Invalid(
                "enrichment max_distance_km must not be negative".into(),
            ));
        }
        Ok(())
    }
}

/// `<data dir>/media-dedup/dedup.db`, falling back to the working directory
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("media-dedup")
        .join("dedup.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DedupConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.threshold, 5);
        assert!(config.recursive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DedupConfig::from_json(r#"{ "workers": 8, "lock": { "wait": true } }"#).unwrap();
        assert_eq!(config.workers, 8);
        assert!(config.lock.wait);
        assert_eq!(config.lock.timeout_secs, 3600);
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn extensions_are_normalized() {
        let config = DedupConfig::from_json(r#"{ "extensions": [".JPG", "png", " "] }"#).unwrap();
        assert_eq!(config.extensions, vec!["jpg", "png"]);

        let mut config = DedupConfig::default();
        config.set_extensions("HEIC, .tif");
        assert_eq!(config.extensions, vec!["heic", "tif"]);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = DedupConfig::from_json("{ workers: ");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config = DedupConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_size_bounds() {
        let config = DedupConfig {
            min_size: Some(100),
            max_size: Some(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_threshold_above_hash_width() {
        let config = DedupConfig {
            threshold: 65,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn purge_lease_is_at_least_two_hours() {
        let settings = LockSettings::default();
        assert_eq!(settings.timeout_for(LockName::Purge), Duration::from_secs(7200));
        assert_eq!(settings.timeout_for(LockName::Scan), Duration::from_secs(3600));
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let result = DedupConfig::discover(Some(Path::new("/nonexistent/config.json")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}

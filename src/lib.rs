//! # Media Dedup
//!
//! Scans media collections, fingerprints every file and records exact and
//! near duplicates in a shared SQLite database.
//!
//! ## Core Philosophy
//! - **Never delete** - duplicates are recorded, not removed
//! - **Earliest wins** - a duplicate always points at the oldest record
//! - **Safe to re-run** - scanning the same tree twice changes nothing
//!
//! ## Architecture
//! The library holds the engine; the binary is a thin clap front end:
//! - `core` - Discovery, hashing, persistence, locking and clustering
//! - `config` - Run configuration loaded from JSON
//! - `events` - Progress reporting over channels
//! - `error` - Typed errors with exit codes

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use config::DedupConfig;
pub use error::{DedupError, Result};

/// Initialize tracing for the library
///
/// Honors `RUST_LOG`; otherwise logs at `info`, or `debug` when `verbose`.
/// Output goes to stderr so stdout stays clean for `--output json`. A second
/// call is a no-op.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_tracing_twice_does_not_panic() {
        super::init_tracing(false);
        super::init_tracing(true);
    }
}

//! # Pipeline Module
//!
//! Orchestrates a scan run.
//!
//! ## Pipeline Stages
//! 1. **Lock** - take the `scan` lease lock, or fail naming its holder
//! 2. **Discover** - lazily walk the root with extension and size filters
//! 3. **Fingerprint** - hash candidates on the worker pool
//! 4. **Classify** - persist each result as it completes, on this thread
//! 5. **Enrich** - optionally attach metadata to the fresh record
//! 6. **Release** - always, whether the run succeeded or not
//!
//! ## Failure Policy
//! A file that cannot be read is logged and skipped. Anything that touches
//! shared state (the store, the lock, place resolution of a GPS-tagged file)
//! aborts the whole run. Records already written stay valid, and a re-run
//! picks up where it stopped without duplicating them.

mod executor;

pub use executor::{FileDisposition, Pipeline, ScanReport};

//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the scan pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Lock lifecycle
    Lock(LockEvent),
    /// Fingerprinting results
    Hash(HashEvent),
    /// Persisted classifications
    Classify(ClassifyEvent),
    /// Pipeline-level events
    Pipeline(PipelineEvent),
}

/// Lock lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LockEvent {
    Acquired { lock_name: String },
    Released { lock_name: String },
}

/// Events from the fingerprint pool, in completion order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HashEvent {
    /// A result arrived from a worker
    Progress(HashProgress),
    /// A file could not be read and was skipped
    Skipped { path: PathBuf, message: String },
}

/// Progress information during fingerprinting.
///
/// Discovery is lazy, so there is no total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashProgress {
    /// Results received so far
    pub completed: usize,
    /// Path of the latest result
    pub current_path: PathBuf,
}

/// Events from the duplicate classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifyEvent {
    /// A record was written
    Persisted {
        path: PathBuf,
        id: i64,
        duplicate_of_id: Option<i64>,
    },
    /// Enrichment ran for a record
    Enriched { path: PathBuf, place: Option<String> },
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Pipeline has started on a root folder
    Started { root: PathBuf, workers: usize },
    /// Moving to a new phase
    PhaseChanged { phase: PipelinePhase },
    /// Pipeline completed successfully
    Completed { summary: PipelineSummary },
    /// Pipeline stopped on a fatal error
    Aborted { message: String },
}

/// Phases of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Locking,
    Fingerprinting,
    Releasing,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub candidates: usize,
    pub processed: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub duration_ms: u64,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Locking => write!(f, "Locking"),
            PipelinePhase::Fingerprinting => write!(f, "Fingerprinting"),
            PipelinePhase::Releasing => write!(f, "Releasing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Hash(HashEvent::Progress(HashProgress {
            completed: 50,
            current_path: PathBuf::from("/photos/a.jpg"),
        }));

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Hash(HashEvent::Progress(p)) => assert_eq!(p.completed, 50),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn summary_is_serializable() {
        let summary = PipelineSummary {
            candidates: 1000,
            processed: 990,
            skipped: 10,
            duplicates: 150,
            duration_ms: 5000,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"skipped\":10"));
    }
}

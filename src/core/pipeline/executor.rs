//! Pipeline execution implementation.

use crate::config::DedupConfig;
use crate::core::comparator::{Classification, ClassifyOutcome, DuplicateClassifier};
use crate::core::hasher::{FileHasher, Fingerprinter, FingerprintResult, HashPool};
use crate::core::lock::{DatabaseLock, LockGuard, LockName, WaitPolicy};
use crate::core::metadata::{Enricher, Enrichment, ExifEnricher, GazetteerResolver};
use crate::core::scanner::{ScanConfig, WalkDirScanner};
use crate::core::store::Store;
use crate::error::DedupError;
use crate::events::{
    null_sender, ClassifyEvent, Event, EventSender, HashEvent, HashProgress, LockEvent,
    PipelineEvent, PipelinePhase, PipelineSummary,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// What happened to one fingerprinted file
#[derive(Debug, Clone, PartialEq)]
pub enum FileDisposition {
    /// A record was written (or refreshed)
    Persisted {
        path: PathBuf,
        classification: Classification,
        place: Option<String>,
    },
    /// The file could not be read; nothing was written
    Skipped { path: PathBuf, reason: String },
}

/// Counters for a completed run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub root: PathBuf,
    /// Files yielded by discovery
    pub candidates: usize,
    /// Files persisted
    pub processed: usize,
    /// Files dropped because they could not be read
    pub skipped: usize,
    /// Paths seen for the first time
    pub new_records: usize,
    /// Processed files marked as duplicates
    pub duplicates: usize,
    /// Known paths whose classification changed
    pub updated: usize,
    /// Files that received enrichment metadata
    pub enriched: usize,
    pub duration_ms: u64,
    pub workers: usize,
}

impl ScanReport {
    fn record(&mut self, disposition: &FileDisposition) {
        match disposition {
            FileDisposition::Persisted {
                classification,
                place,
                ..
            } => {
                self.processed += 1;
                if classification.is_duplicate() {
                    self.duplicates += 1;
                }
                match classification.outcome {
                    ClassifyOutcome::Inserted => self.new_records += 1,
                    ClassifyOutcome::Updated => self.updated += 1,
                    ClassifyOutcome::Unchanged => {}
                }
                if place.is_some() {
                    self.enriched += 1;
                }
            }
            FileDisposition::Skipped { .. } => self.skipped += 1,
        }
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            candidates: self.candidates,
            processed: self.processed,
            skipped: self.skipped,
            duplicates: self.duplicates,
            duration_ms: self.duration_ms,
        }
    }
}

/// The scan-and-persist orchestrator
pub struct Pipeline {
    config: DedupConfig,
    hasher: Box<dyn FileHasher>,
    enricher: Option<Box<dyn Enricher>>,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration.
    ///
    /// When enrichment is enabled the gazetteer is loaded here, so a bad
    /// gazetteer fails before any lock is taken.
    pub fn new(config: DedupConfig) -> Result<Self, DedupError> {
        config.validate()?;

        let enricher: Option<Box<dyn Enricher>> = if config.enrichment.enabled {
            let settings = &config.enrichment;
            let resolver = match &settings.gazetteer {
                Some(path) => GazetteerResolver::load(path, settings.max_distance_km)?,
                None => GazetteerResolver::new(Vec::new(), settings.max_distance_km),
            };
            Some(Box::new(ExifEnricher::new(resolver)))
        } else {
            None
        };

        Ok(Self {
            config,
            hasher: Box::new(Fingerprinter::new()),
            enricher,
        })
    }

    /// Replace the enrichment collaborator
    pub fn with_enricher(mut self, enricher: Box<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Replace the fingerprint function
    pub fn with_hasher(mut self, hasher: Box<dyn FileHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Run without events
    pub fn run(&self, root: &Path, store: &Store) -> Result<ScanReport, DedupError> {
        self.run_with_events(root, store, &null_sender())
    }

    /// Scan `root` into `store` under the `scan` lock
    pub fn run_with_events(
        &self,
        root: &Path,
        store: &Store,
        events: &EventSender,
    ) -> Result<ScanReport, DedupError> {
        let start_time = Instant::now();
        events.send(Event::Pipeline(PipelineEvent::Started {
            root: root.to_path_buf(),
            workers: self.config.workers,
        }));

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Locking,
        }));
        let guard = match self.acquire_lock(store) {
            Ok(guard) => guard,
            Err(e) => {
                events.send(Event::Pipeline(PipelineEvent::Aborted {
                    message: e.to_string(),
                }));
                return Err(e);
            }
        };
        let lock_name = guard.record().lock_name.clone();
        events.send(Event::Lock(LockEvent::Acquired {
            lock_name: lock_name.clone(),
        }));

        let outcome = self.scan_locked(root, store, events);

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Releasing,
        }));
        let released = guard.release();
        events.send(Event::Lock(LockEvent::Released { lock_name }));

        match (outcome, released) {
            (Ok(mut report), Ok(())) => {
                report.duration_ms = start_time.elapsed().as_millis() as u64;
                tracing::info!(
                    "Scan of {} finished: {} candidates, {} processed, {} skipped, {} duplicates",
                    report.root.display(),
                    report.candidates,
                    report.processed,
                    report.skipped,
                    report.duplicates
                );
                events.send(Event::Pipeline(PipelineEvent::Completed {
                    summary: report.summary(),
                }));
                Ok(report)
            }
            (Ok(_), Err(e)) => {
                tracing::error!("Scan finished but the lock could not be released: {}", e);
                events.send(Event::Pipeline(PipelineEvent::Aborted {
                    message: e.to_string(),
                }));
                Err(e.into())
            }
            (Err(e), released) => {
                if let Err(release_error) = released {
                    tracing::error!("Failed to release lock after abort: {}", release_error);
                }
                tracing::error!("Scan aborted: {}", e);
                events.send(Event::Pipeline(PipelineEvent::Aborted {
                    message: e.to_string(),
                }));
                Err(e)
            }
        }
    }

    fn acquire_lock<'s>(&self, store: &'s Store) -> Result<LockGuard<'s>, DedupError> {
        let settings = &self.config.lock;
        let mut lock = DatabaseLock::new(store, LockName::Scan, settings.timeout_for(LockName::Scan));
        if settings.wait {
            lock = lock.waiting(WaitPolicy {
                timeout: settings.wait_timeout(),
                poll_interval: settings.poll_interval(),
            });
        }
        Ok(lock.acquire()?)
    }

    /// Discovery, fingerprinting and persistence. The lock is held.
    fn scan_locked(
        &self,
        root: &Path,
        store: &Store,
        events: &EventSender,
    ) -> Result<ScanReport, DedupError> {
        let scanner = WalkDirScanner::new(ScanConfig {
            recursive: self.config.recursive,
            follow_symlinks: false,
            extensions: self.config.extensions.clone(),
            min_size: self.config.min_size,
            max_size: self.config.max_size,
        });
        let candidates = scanner.candidates(root)?;
        let pool = HashPool::new(self.config.workers)?;

        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Fingerprinting,
        }));

        let discovered = AtomicUsize::new(0);
        let candidates = candidates
            .take(self.config.limit.unwrap_or(usize::MAX))
            .inspect(|_| {
                discovered.fetch_add(1, Ordering::Relaxed);
            });

        let mut report = ScanReport {
            root: root.to_path_buf(),
            workers: pool.workers(),
            ..Default::default()
        };
        let mut received = 0;

        pool.run(candidates, self.hasher.as_ref(), |result| {
            received += 1;
            events.send(Event::Hash(HashEvent::Progress(HashProgress {
                completed: received,
                current_path: result.path.clone(),
            })));

            let disposition = self.process(result, store)?;
            match &disposition {
                FileDisposition::Persisted {
                    path,
                    classification,
                    place,
                } => {
                    events.send(Event::Classify(ClassifyEvent::Persisted {
                        path: path.clone(),
                        id: classification.id,
                        duplicate_of_id: classification.duplicate_of_id,
                    }));
                    if self.enricher.is_some() {
                        events.send(Event::Classify(ClassifyEvent::Enriched {
                            path: path.clone(),
                            place: place.clone(),
                        }));
                    }
                }
                FileDisposition::Skipped { path, reason } => {
                    events.send(Event::Hash(HashEvent::Skipped {
                        path: path.clone(),
                        message: reason.clone(),
                    }));
                }
            }
            report.record(&disposition);
            Ok::<(), DedupError>(())
        })?;

        report.candidates = discovered.load(Ordering::Relaxed);
        Ok(report)
    }

    /// Classify one result and enrich its record.
    ///
    /// Unreadable files come back as `Skipped`. A file that vanishes before
    /// enrichment keeps its record without metadata. Store failures and
    /// unresolvable locations are returned as errors and end the run.
    fn process(&self, result: FingerprintResult, store: &Store) -> Result<FileDisposition, DedupError> {
        let FingerprintResult {
            path,
            size,
            outcome,
        } = result;

        let fingerprint = match outcome {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", path.display(), e);
                return Ok(FileDisposition::Skipped {
                    path,
                    reason: e.to_string(),
                });
            }
        };

        let classification = DuplicateClassifier::new(store).classify(&path, size, &fingerprint)?;

        let mut place = None;
        if let Some(enricher) = &self.enricher {
            let enrichment = match enricher.enrich(&path) {
                Ok(enrichment) => enrichment.unwrap_or_default(),
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Not enriching {}: {}", path.display(), e);
                    Enrichment::default()
                }
                Err(e) => return Err(e.into()),
            };

            // Columns from an earlier scan of this path are overwritten, even
            // when nothing was read this time.
            store.set_enrichment(classification.id, &enrichment.columns())?;
            let related = match &enrichment.content_identifier {
                Some(identifier) => store
                    .earliest_by_content_identifier(identifier, Some(classification.id))?
                    .filter(|id| *id < classification.id),
                None => None,
            };
            store.set_related(classification.id, related)?;
            place = enrichment.place;
        }

        Ok(FileDisposition::Persisted {
            path,
            classification,
            place,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::GpsCoordinates;
    use crate::core::scanner::CandidateFile;
    use crate::error::{EnrichError, HashError, LockAcquisitionError};
    use crate::events::EventChannel;
    use std::fs;
    use tempfile::TempDir;

    fn config(workers: usize) -> DedupConfig {
        DedupConfig {
            workers,
            ..Default::default()
        }
    }

    /// Fails every file whose name starts with "unreadable"
    struct FlakyHasher;

    impl FileHasher for FlakyHasher {
        fn fingerprint(&self, candidate: &CandidateFile) -> FingerprintResult {
            let unreadable = candidate
                .path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("unreadable"));
            if unreadable {
                return FingerprintResult {
                    path: candidate.path.clone(),
                    size: candidate.size,
                    outcome: Err(HashError::Io {
                        path: candidate.path.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                    }),
                };
            }
            Fingerprinter::new().fingerprint(candidate)
        }
    }

    /// Pretends every file was shot at the same unnamed spot
    struct NowhereEnricher;

    impl Enricher for NowhereEnricher {
        fn enrich(&self, path: &Path) -> Result<Option<Enrichment>, EnrichError> {
            Err(EnrichError::Unresolvable {
                path: path.to_path_buf(),
                latitude: 0.0,
                longitude: 0.0,
            })
        }
    }

    /// Tags every file with one burst identifier and a named place
    struct BurstEnricher;

    impl Enricher for BurstEnricher {
        fn enrich(&self, _path: &Path) -> Result<Option<Enrichment>, EnrichError> {
            Ok(Some(Enrichment {
                gps: Some(GpsCoordinates {
                    latitude: 1.0,
                    longitude: 2.0,
                }),
                place: Some("Somewhere".into()),
                content_identifier: Some("burst-42".into()),
                ..Default::default()
            }))
        }
    }

    /// Deletes files named "gone*" right after fingerprinting them
    struct VanishingHasher;

    impl FileHasher for VanishingHasher {
        fn fingerprint(&self, candidate: &CandidateFile) -> FingerprintResult {
            let result = Fingerprinter::new().fingerprint(candidate);
            let gone = candidate
                .path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with("gone"));
            if gone {
                fs::remove_file(&candidate.path).unwrap();
            }
            result
        }
    }

    /// Finds no metadata at all
    struct BlankEnricher;

    impl Enricher for BlankEnricher {
        fn enrich(&self, _path: &Path) -> Result<Option<Enrichment>, EnrichError> {
            Ok(None)
        }
    }

    #[test]
    fn empty_directory_yields_empty_report() {
        let dir = TempDir::new().unwrap();
        let store = Store::open_in_memory().unwrap();

        let report = Pipeline::new(config(2)).unwrap().run(dir.path(), &store).unwrap();

        assert_eq!(report.candidates, 0);
        assert_eq!(report.processed, 0);
        assert!(store.get_lock("scan").unwrap().is_none());
    }

    #[test]
    fn same_content_files_are_linked() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "same").unwrap();
        fs::write(dir.path().join("b.txt"), "same").unwrap();
        let store = Store::open_in_memory().unwrap();

        let report = Pipeline::new(config(4)).unwrap().run(dir.path(), &store).unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.duplicates, 1);
        let records = store.list_files(None).unwrap();
        let original = records.iter().find(|r| !r.is_duplicate).unwrap();
        let duplicate = records.iter().find(|r| r.is_duplicate).unwrap();
        assert_eq!(duplicate.duplicate_of_id, Some(original.id));
        assert!(original.id < duplicate.id);
    }

    #[test]
    fn unreadable_files_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.txt"), "fine").unwrap();
        fs::write(dir.path().join("unreadable.txt"), "nope").unwrap();
        let store = Store::open_in_memory().unwrap();

        let report = Pipeline::new(config(2))
            .unwrap()
            .with_hasher(Box::new(FlakyHasher))
            .run(dir.path(), &store)
            .unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.stats().unwrap().total, 1);
    }

    #[test]
    fn limit_caps_candidates() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            fs::write(dir.path().join(format!("{}.txt", i)), i.to_string()).unwrap();
        }
        let store = Store::open_in_memory().unwrap();
        let config = DedupConfig {
            limit: Some(3),
            ..config(2)
        };

        let report = Pipeline::new(config).unwrap().run(dir.path(), &store).unwrap();

        assert_eq!(report.candidates, 3);
        assert_eq!(store.stats().unwrap().total, 3);
    }

    #[test]
    fn rescan_changes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "same").unwrap();
        fs::write(dir.path().join("b.txt"), "same").unwrap();
        fs::write(dir.path().join("c.txt"), "other").unwrap();
        let store = Store::open_in_memory().unwrap();
        let pipeline = Pipeline::new(config(3)).unwrap();

        pipeline.run(dir.path(), &store).unwrap();
        let before: Vec<_> = store
            .list_files(None)
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.path, r.is_duplicate, r.duplicate_of_id))
            .collect();

        let second = pipeline.run(dir.path(), &store).unwrap();
        let after: Vec<_> = store
            .list_files(None)
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.path, r.is_duplicate, r.duplicate_of_id))
            .collect();

        assert_eq!(before, after);
        assert_eq!(second.new_records, 0);
        assert_eq!(second.updated, 0);
    }

    #[test]
    fn held_lock_aborts_before_scanning() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let store = Store::open_in_memory().unwrap();
        store
            .insert_lock("scan", 999, "elsewhere", crate::core::store::now(), None)
            .unwrap();

        let err = Pipeline::new(config(1)).unwrap().run(dir.path(), &store).unwrap_err();

        assert!(matches!(
            err,
            DedupError::Lock(LockAcquisitionError::Held { process_id: 999, .. })
        ));
        assert_eq!(store.stats().unwrap().total, 0);
    }

    #[test]
    fn unresolvable_enrichment_aborts_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        for i in 0..20 {
            fs::write(dir.path().join(format!("{}.jpg", i)), i.to_string()).unwrap();
        }
        let store = Store::open_in_memory().unwrap();
        let (sender, receiver) = EventChannel::new();

        let err = Pipeline::new(config(2))
            .unwrap()
            .with_enricher(Box::new(NowhereEnricher))
            .run_with_events(dir.path(), &store, &sender)
            .unwrap_err();

        assert!(matches!(err, DedupError::Enrich(EnrichError::Unresolvable { .. })));
        assert_eq!(err.exit_code(), 1);
        assert!(store.get_lock("scan").unwrap().is_none());
        // The first record was written before its enrichment failed
        assert_eq!(store.stats().unwrap().total, 1);

        drop(sender);
        let aborted = receiver
            .iter()
            .any(|e| matches!(e, Event::Pipeline(PipelineEvent::Aborted { .. })));
        assert!(aborted);
    }

    #[test]
    fn shared_identifier_sets_related_id() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), "frame one").unwrap();
        fs::write(dir.path().join("b.jpg"), "frame two").unwrap();
        let store = Store::open_in_memory().unwrap();

        let report = Pipeline::new(config(1))
            .unwrap()
            .with_enricher(Box::new(BurstEnricher))
            .run(dir.path(), &store)
            .unwrap();

        assert_eq!(report.enriched, 2);
        let records = store.list_files(None).unwrap();
        assert_eq!(records[0].related_id, None);
        assert_eq!(records[1].related_id, Some(records[0].id));
        assert_eq!(records[1].place.as_deref(), Some("Somewhere"));
        assert!(!records[1].is_duplicate);
    }

    #[test]
    fn vanished_file_is_persisted_without_enrichment() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("gone.jpg"), "short lived").unwrap();
        fs::write(dir.path().join("kept.jpg"), "still here").unwrap();
        let store = Store::open_in_memory().unwrap();
        let enricher = ExifEnricher::new(GazetteerResolver::new(Vec::new(), 5.0));

        let report = Pipeline::new(config(1))
            .unwrap()
            .with_hasher(Box::new(VanishingHasher))
            .with_enricher(Box::new(enricher))
            .run(dir.path(), &store)
            .unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.enriched, 0);
        let gone = store
            .get_file_by_path(&dir.path().join("gone.jpg"))
            .unwrap()
            .unwrap();
        assert_eq!(gone.place, None);
        assert!(store.get_lock("scan").unwrap().is_none());
    }

    #[test]
    fn rescan_without_metadata_clears_earlier_enrichment() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.jpg"), "frame one").unwrap();
        fs::write(dir.path().join("b.jpg"), "frame two").unwrap();
        let store = Store::open_in_memory().unwrap();

        Pipeline::new(config(1))
            .unwrap()
            .with_enricher(Box::new(BurstEnricher))
            .run(dir.path(), &store)
            .unwrap();
        let report = Pipeline::new(config(1))
            .unwrap()
            .with_enricher(Box::new(BlankEnricher))
            .run(dir.path(), &store)
            .unwrap();

        assert_eq!(report.enriched, 0);
        for record in store.list_files(None).unwrap() {
            assert_eq!(record.gps, None);
            assert_eq!(record.place, None);
            assert_eq!(record.related_id, None);
            assert_eq!(record.content_identifier, None);
        }
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let result = Pipeline::new(config(0));
        assert!(matches!(result, Err(DedupError::Config(_))));
    }

    #[test]
    fn events_follow_the_run() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let store = Store::open_in_memory().unwrap();
        let (sender, receiver) = EventChannel::new();

        Pipeline::new(config(1))
            .unwrap()
            .run_with_events(dir.path(), &store, &sender)
            .unwrap();
        drop(sender);

        let events: Vec<Event> = receiver.iter().collect();
        assert!(matches!(events.first(), Some(Event::Pipeline(PipelineEvent::Started { .. }))));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Lock(LockEvent::Acquired { .. }))));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Classify(ClassifyEvent::Persisted { .. }))));
        assert!(matches!(
            events.last(),
            Some(Event::Pipeline(PipelineEvent::Completed { .. }))
        ));
    }
}

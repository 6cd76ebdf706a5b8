//! Bounded fingerprint worker pool.
//!
//! A dedicated rayon pool of `workers` threads pulls candidates from the
//! (lazy) discovery iterator and sends each result over a bounded crossbeam
//! channel. The calling thread drains the channel in completion order and
//! hands every result to a sink. If the sink fails, the pool stops pulling
//! new candidates and the error is returned once in-flight work has drained.

use super::{FileHasher, FingerprintResult};
use crate::core::scanner::CandidateFile;
use crate::error::DedupError;
use crossbeam_channel::bounded;
use rayon::iter::{ParallelBridge, ParallelIterator};
use rayon::ThreadPool;
use std::sync::atomic::{AtomicBool, Ordering};

/// Fixed-size pool of fingerprint workers
pub struct HashPool {
    pool: ThreadPool,
    workers: usize,
}

impl HashPool {
    /// Build a pool with `workers` threads (at least one)
    pub fn new(workers: usize) -> Result<Self, DedupError> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fingerprint-{}", i))
            .build()
            .map_err(|e| DedupError::Pool(e.to_string()))?;

        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fingerprint every candidate and feed each result to `sink`.
    ///
    /// Exactly one result is delivered per candidate unless the sink returns
    /// an error, in which case processing stops early. Returns the number of
    /// results delivered.
    pub fn run<I, H, F, E>(&self, candidates: I, hasher: &H, mut sink: F) -> Result<usize, E>
    where
        I: IntoIterator<Item = CandidateFile>,
        I::IntoIter: Send,
        H: FileHasher + ?Sized,
        F: FnMut(FingerprintResult) -> Result<(), E>,
    {
        let (tx, rx) = bounded::<FingerprintResult>(self.workers * 2);
        let stop = AtomicBool::new(false);
        let candidates = candidates.into_iter();

        std::thread::scope(|scope| {
            let stop = &stop;
            let pool = &self.pool;

            scope.spawn(move || {
                pool.install(|| {
                    candidates
                        .take_while(|_| !stop.load(Ordering::Relaxed))
                        .par_bridge()
                        .for_each_with(tx, |tx, candidate| {
                            if stop.load(Ordering::Relaxed) {
                                return;
                            }
                            // A closed channel means the consumer gave up.
                            if tx.send(hasher.fingerprint(&candidate)).is_err() {
                                stop.store(true, Ordering::Relaxed);
                            }
                        });
                });
            });

            // Owned here so an early return closes the channel before the
            // scope joins the feeder thread.
            let rx = rx;
            let mut delivered = 0;
            for result in rx.iter() {
                delivered += 1;
                if let Err(e) = sink(result) {
                    stop.store(true, Ordering::Relaxed);
                    return Err(e);
                }
            }
            Ok(delivered)
        })
    }
}

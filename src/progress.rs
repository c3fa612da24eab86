//! Progress tracking for conversion batches.
//!
//! Counters live on a [`BatchProgress`] owned by the scheduler and shared
//! with its workers by reference; there is no process-wide state. Workers
//! record through atomics; anyone holding the tracker can take a cheap
//! [`ProgressSnapshot`] for log lines and the trailing summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared counters for one conversion batch.
pub struct BatchProgress {
    total_jobs: u64,
    done_jobs: AtomicU64,
    failed_jobs: AtomicU64,
    skipped_jobs: AtomicU64,
    blobs: AtomicU64,
    bytes: AtomicU64,
    started: Instant,
}

impl BatchProgress {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            total_jobs: total_jobs as u64,
            done_jobs: AtomicU64::new(0),
            failed_jobs: AtomicU64::new(0),
            skipped_jobs: AtomicU64::new(0),
            blobs: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record one emitted blob of `size` bytes.
    pub fn record_blob(&self, size: u64) {
        self.blobs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
    }

    pub fn record_job_done(&self) {
        self.done_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self) {
        self.failed_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_skipped(&self) {
        self.skipped_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_jobs: self.total_jobs,
            done_jobs: self.done_jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            skipped_jobs: self.skipped_jobs.load(Ordering::Relaxed),
            blobs: self.blobs.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Point-in-time view of a batch.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub total_jobs: u64,
    pub done_jobs: u64,
    pub failed_jobs: u64,
    pub skipped_jobs: u64,
    pub blobs: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Jobs settled so far, whatever their outcome.
    pub fn settled_jobs(&self) -> u64 {
        self.done_jobs + self.failed_jobs + self.skipped_jobs
    }

    /// Average throughput over the batch so far.
    pub fn throughput_mib_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_aggregate_across_threads() {
        let progress = BatchProgress::new(4);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        progress.record_blob(10);
                    }
                    progress.record_job_done();
                });
            }
        });
        let snap = progress.snapshot();
        assert_eq!(snap.blobs, 400);
        assert_eq!(snap.bytes, 4000);
        assert_eq!(snap.done_jobs, 4);
        assert_eq!(snap.settled_jobs(), 4);
    }
}

//! PALIMPSEST - Store Metrics & Observability
//! Provides atomic counters for tracking store operations
//! in a lock-free, thread-safe manner using `AtomicU64`.
//!
//! Counters live outside the engine lock, so recording never
//! extends a critical section.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic operation counters for the store.
///
/// All counters use `Ordering::Relaxed`; they are for observability only.
#[derive(Debug)]
pub struct StoreMetrics {
    /// Transactions started.
    pub begins: AtomicU64,
    /// Successful inserts.
    pub inserts: AtomicU64,
    /// Successful updates.
    pub updates: AtomicU64,
    /// Successful deletes.
    pub deletes: AtomicU64,
    /// Snapshot reads served.
    pub reads: AtomicU64,
    /// Versions returned across all reads.
    pub versions_read: AtomicU64,
    /// Successful commits.
    pub commits: AtomicU64,
    /// Successful aborts.
    pub aborts: AtomicU64,
    /// Updates that had to wait on another transaction.
    pub write_waits: AtomicU64,
    /// Operations that returned an error.
    pub failures: AtomicU64,
    store_started: Instant,
}

impl StoreMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            begins: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            versions_read: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
            write_waits: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            store_started: Instant::now(),
        }
    }

    pub fn record_begin(&self) {
        self.begins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_insert(&self, ok: bool) {
        self.record_outcome(&self.inserts, ok);
    }

    pub fn record_update(&self, ok: bool) {
        self.record_outcome(&self.updates, ok);
    }

    pub fn record_delete(&self, ok: bool) {
        self.record_outcome(&self.deletes, ok);
    }

    pub fn record_commit(&self, ok: bool) {
        self.record_outcome(&self.commits, ok);
    }

    pub fn record_abort(&self, ok: bool) {
        self.record_outcome(&self.aborts, ok);
    }

    /// Record a read that returned `visible` versions.
    pub fn record_read(&self, visible: usize) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.versions_read
            .fetch_add(visible as u64, Ordering::Relaxed);
    }

    /// Record an update that blocked on a foreign pending head.
    pub fn record_wait(&self) {
        self.write_waits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, counter: &AtomicU64, ok: bool) {
        if ok {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get store uptime in seconds.
    pub fn uptime_secs(&self) -> f64 {
        self.store_started.elapsed().as_secs_f64()
    }

    /// Total successful operations of every kind.
    pub fn total_ops(&self) -> u64 {
        self.begins.load(Ordering::Relaxed)
            + self.inserts.load(Ordering::Relaxed)
            + self.updates.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
            + self.reads.load(Ordering::Relaxed)
            + self.commits.load(Ordering::Relaxed)
            + self.aborts.load(Ordering::Relaxed)
    }

    /// Get operations per second since the store was created.
    pub fn ops_per_sec(&self) -> f64 {
        let uptime = self.uptime_secs();
        if uptime < 0.001 {
            return 0.0;
        }
        self.total_ops() as f64 / uptime
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        format!(
            "\n═══ PALIMPSEST Store Metrics ═══\n\
             Transactions:\n\
               begun:     {}\n\
               committed: {}\n\
               aborted:   {}\n\
             Writes:\n\
               inserts:   {}\n\
               updates:   {}\n\
               deletes:   {}\n\
               waits:     {}\n\
             Reads:\n\
               reads:     {}\n\
               versions:  {}\n\
             Throughput:\n\
               total ops: {}\n\
               ops/sec:   {:.2}\n\
               failures:  {}\n\
             Uptime: {:.2}s",
            self.begins.load(Ordering::Relaxed),
            self.commits.load(Ordering::Relaxed),
            self.aborts.load(Ordering::Relaxed),
            self.inserts.load(Ordering::Relaxed),
            self.updates.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
            self.write_waits.load(Ordering::Relaxed),
            self.reads.load(Ordering::Relaxed),
            self.versions_read.load(Ordering::Relaxed),
            self.total_ops(),
            self.ops_per_sec(),
            self.failures.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

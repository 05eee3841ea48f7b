//! PALIMPSEST - Concurrent Store
//! Thread-safe wrapper around the MVCC engine.
//!
//! ## Concurrency Model
//! - **Read operations** (`read`, `history`, `status`, ...) acquire a **read lock** (shared)
//! - **Write operations** (`begin`, `insert`, `update`, `delete`, `commit`, `abort`)
//!   acquire a **write lock** (exclusive)
//! - An `update` that must wait for another transaction's pending head
//!   **releases** the write lock before sleeping on a condition variable,
//!   so the commit or abort that unblocks it can always get in.
//!
//! ## Wake-ups
//! A "settle generation" counter is bumped every time a transaction leaves
//! `Active`. A blocked updater reads the generation while it still holds the
//! write lock, then sleeps until the generation moves. Lock order is always
//! engine lock first, settle mutex second.

use std::sync::{Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::config::Config;
use crate::error::{MvccError, Result};
use crate::types::{Key, Match, Payload, Timestamp, TxnId, VersionView};

use super::metrics::StoreMetrics;
use super::transaction::TxnStatus;
use super::{MvccEngine, UpdateAttempt};

/// Thread-safe MVCC record store.
///
/// ## Example
/// ```
/// use palimpsest::engine::concurrent::Store;
/// use palimpsest::types::Payload;
/// use std::sync::Arc;
/// use std::thread;
///
/// let store = Arc::new(Store::new());
///
/// let t1 = store.begin();
/// store.insert(t1, b"a".to_vec(), Payload::new("v1")).unwrap();
/// store.commit(t1).unwrap();
///
/// let writer = Arc::clone(&store);
/// thread::spawn(move || {
///     let t2 = writer.begin();
///     writer.update(t2, b"a".to_vec(), Payload::new("v2")).unwrap();
///     writer.commit(t2).unwrap();
/// })
/// .join()
/// .unwrap();
///
/// assert_eq!(store.read(t1)[0].payload.value, "v1");
/// ```
#[derive(Debug)]
pub struct Store {
    inner: RwLock<MvccEngine>,
    /// Bumped whenever a transaction commits or aborts.
    settled: Mutex<u64>,
    settled_cv: Condvar,
    metrics: StoreMetrics,
}

impl Store {
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create an empty store.
    pub fn with_config(config: Config) -> Self {
        Self {
            inner: RwLock::new(MvccEngine::new(config)),
            settled: Mutex::new(0),
            settled_cv: Condvar::new(),
            metrics: StoreMetrics::new(),
        }
    }

    /// Start a transaction (write lock).
    pub fn begin(&self) -> TxnId {
        let id = self.write().begin();
        self.metrics.record_begin();
        id
    }

    /// Insert the first version of a key (write lock).
    pub fn insert(&self, txn: TxnId, key: Key, payload: Payload) -> Result<()> {
        let result = self.write().insert(txn, key, payload);
        self.metrics.record_insert(result.is_ok());
        result
    }

    /// Append a new version on top of a key's head (write lock).
    ///
    /// Blocks while the head was written by a different transaction that is
    /// still active. The lock is never held while blocked. With
    /// `Config::wait_timeout` set, gives up with `WaitTimeout` once the
    /// deadline passes.
    pub fn update(&self, txn: TxnId, key: Key, payload: Payload) -> Result<()> {
        let mut key = key;
        let mut payload = payload;
        let mut deadline: Option<Instant> = None;
        let mut waited = false;

        loop {
            let mut engine = self.write();
            let attempt = match engine.try_update(txn, key, payload) {
                Ok(attempt) => attempt,
                Err(err) => {
                    self.metrics.record_update(false);
                    return Err(err);
                }
            };

            let blocker = match attempt {
                UpdateAttempt::Linked => {
                    if waited {
                        log::debug!("T{} resumed update", txn);
                    }
                    self.metrics.record_update(true);
                    return Ok(());
                }
                UpdateAttempt::Blocked {
                    blocker,
                    key: k,
                    payload: p,
                } => {
                    key = k;
                    payload = p;
                    blocker
                }
            };

            let timeout = engine.config().wait_timeout;
            let generation = *self.settled_lock();
            drop(engine);

            if !waited {
                log::debug!(
                    "T{} blocked by T{} on {:?}",
                    txn,
                    blocker,
                    String::from_utf8_lossy(&key)
                );
                self.metrics.record_wait();
                waited = true;
                deadline = timeout.map(|t| Instant::now() + t);
            }

            if !self.wait_for_settle(generation, deadline) {
                log::warn!("T{} gave up waiting on T{}", txn, blocker);
                self.metrics.record_update(false);
                return Err(MvccError::WaitTimeout { txn, blocker });
            }
        }
    }

    /// Mark a key's head deleted in place (write lock).
    pub fn delete(&self, txn: TxnId, key: &[u8]) -> Result<()> {
        let result = self.write().delete(txn, key);
        self.metrics.record_delete(result.is_ok());
        result
    }

    /// Commit a transaction and wake blocked updaters (write lock).
    pub fn commit(&self, txn: TxnId) -> Result<()> {
        let mut engine = self.write();
        let result = engine.commit(txn);
        if result.is_ok() {
            self.bump_settled();
        }
        drop(engine);
        self.metrics.record_commit(result.is_ok());
        result
    }

    /// Abort a transaction and wake blocked updaters (write lock).
    pub fn abort(&self, txn: TxnId) -> Result<()> {
        let mut engine = self.write();
        let result = engine.abort(txn);
        if result.is_ok() {
            self.bump_settled();
        }
        drop(engine);
        self.metrics.record_abort(result.is_ok());
        result
    }

    /// Snapshot read at `as_of` (read lock). Never blocks on pending writers.
    pub fn read(&self, as_of: Timestamp) -> Vec<VersionView> {
        let views = self.read_guard().read(as_of);
        self.metrics.record_read(views.len());
        views
    }

    /// Top-`k` visible versions closest to `query` (read lock).
    pub fn read_top_k(&self, as_of: Timestamp, query: &[f32], k: usize) -> Vec<Match> {
        let matches = self.read_guard().read_top_k(as_of, query, k);
        self.metrics.record_read(matches.len());
        matches
    }

    /// Full version chain of a key, newest first (read lock).
    pub fn history(&self, key: &[u8]) -> Vec<VersionView> {
        self.read_guard().history(key)
    }

    /// Status of a transaction (read lock).
    pub fn status(&self, txn: TxnId) -> Option<TxnStatus> {
        self.read_guard().status(txn)
    }

    /// Most recently issued transaction ID (read lock).
    pub fn last_txn_id(&self) -> TxnId {
        self.read_guard().last_txn_id()
    }

    /// Number of keys with a version chain (read lock).
    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    /// Check if the store holds no keys (read lock).
    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, MvccEngine> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MvccEngine> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn settled_lock(&self) -> std::sync::MutexGuard<'_, u64> {
        self.settled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called with the engine write lock held.
    fn bump_settled(&self) {
        let mut generation = self.settled_lock();
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.settled_cv.notify_all();
    }

    /// Sleep until the settle generation moves past `seen`.
    /// Returns false if `deadline` passed first.
    fn wait_for_settle(&self, seen: u64, deadline: Option<Instant>) -> bool {
        let mut generation = self.settled_lock();
        while *generation == seen {
            generation = match deadline {
                None => self
                    .settled_cv
                    .wait(generation)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return false;
                    };
                    self.settled_cv
                        .wait_timeout(generation, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        true
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

//! PALIMPSEST - Store Configuration
//! Defines tunable behaviour of the version store.

use std::time::Duration;

/// Configuration for the version store.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Upper bound on how long `update` waits for another transaction's
    /// pending head to settle. `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,

    /// Whether a read issued with an active transaction's own ID also sees
    /// that transaction's uncommitted versions.
    pub read_own_writes: bool,
}

impl Config {
    /// Create a Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the write-write wait in `update`.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    /// Let readers see their own pending writes.
    pub fn with_read_own_writes(mut self, enabled: bool) -> Self {
        self.read_own_writes = enabled;
        self
    }
}

//! PALIMPSEST - Core Type Definitions
//! Defines fundamental types shared by the version store.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Key type for the store.
/// Using Vec<u8> allows arbitrary binary keys.
pub type Key = Vec<u8>;

/// Value type for the store.
/// `Bytes` keeps payload clones cheap when snapshots are handed out.
pub type Value = Bytes;

/// Transaction identifier. Doubles as the transaction's logical timestamp.
pub type TxnId = u64;

/// Logical timestamp in transaction-ID space.
pub type Timestamp = u64;

/// Open-ended upper bound of a validity interval.
pub const TS_INFINITY: Timestamp = u64::MAX;

/// The data carried by a version: an opaque value, string metadata and an
/// optional embedding. The engine never looks inside the value; the
/// embedding is only consulted by similarity reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub value: Value,
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Payload {
    /// Create a payload with no metadata.
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            metadata: BTreeMap::new(),
            vector: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach an embedding for similarity reads.
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }
}

/// Read-only copy of a version handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionView {
    pub key: Key,
    pub payload: Payload,
    pub begin_ts: Timestamp,
    pub end_ts: Timestamp,
    pub deleted: bool,
    pub created_by: TxnId,
}

impl VersionView {
    /// Returns true if `ts` falls inside `[begin_ts, end_ts)`.
    pub fn covers(&self, ts: Timestamp) -> bool {
        self.begin_ts <= ts && ts < self.end_ts
    }
}

/// One hit of a similarity read: the visible version and its cosine
/// distance to the query (smaller is closer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub view: VersionView,
    pub distance: f32,
}

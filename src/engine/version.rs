//! PALIMPSEST - Versions and Version Chains
//! Every write produces a `Version`. Versions of one key form a singly
//! linked chain from the key's head (newest) toward older versions.
//!
//! ## Storage
//! Versions live in a `VersionArena` and are addressed by `VersionId`.
//! The `older` link is an index into the arena, so a chain is a plain
//! acyclic path of indices owned entirely by the store.

use crate::types::{Key, Payload, Timestamp, TxnId, VersionView, TS_INFINITY};

/// Stable index of a version inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionId(usize);

/// One snapshot of a key's state, valid over `[begin_ts, end_ts)`.
#[derive(Debug, Clone)]
pub struct Version {
    pub key: Key,
    pub payload: Payload,
    pub begin_ts: Timestamp,
    pub end_ts: Timestamp,
    pub deleted: bool,
    pub created_by: TxnId,
    /// Next-older version of the same key.
    pub older: Option<VersionId>,
    /// Transactions that deleted this version in place, oldest first.
    pub deleted_by: Vec<TxnId>,
    /// Begin of the successor whose commit closed this version.
    pub superseded_at: Option<Timestamp>,
}

impl Version {
    /// Stamp a fresh version written by `txn`: valid from `txn` onwards.
    pub fn new(txn: TxnId, key: Key, payload: Payload) -> Self {
        Self {
            key,
            payload,
            begin_ts: txn,
            end_ts: TS_INFINITY,
            deleted: false,
            created_by: txn,
            older: None,
            deleted_by: Vec::new(),
            superseded_at: None,
        }
    }

    /// Close this version in place on behalf of `txn`.
    pub fn mark_deleted(&mut self, txn: TxnId) {
        self.deleted_by.push(txn);
        self.deleted = true;
        self.end_ts = txn;
    }

    /// End validity where a committed successor begins.
    pub fn supersede(&mut self, at: Timestamp) {
        self.superseded_at = Some(at);
        self.end_ts = at;
    }

    /// Drop `txn`'s delete mark. `end_ts` falls back to the previous
    /// stamp only if `txn`'s stamp is still the one in place.
    pub fn undo_delete(&mut self, txn: TxnId) {
        let Some(pos) = self.deleted_by.iter().rposition(|&t| t == txn) else {
            return;
        };
        self.deleted_by.remove(pos);
        self.deleted = !self.deleted_by.is_empty();

        if self.end_ts == txn {
            self.end_ts = self
                .deleted_by
                .last()
                .copied()
                .or(self.superseded_at)
                .unwrap_or(TS_INFINITY);
        }
    }

    /// Returns true if `ts` falls inside the validity interval.
    pub fn covers(&self, ts: Timestamp) -> bool {
        self.begin_ts <= ts && ts < self.end_ts
    }

    /// Copy out a read-only view.
    pub fn view(&self) -> VersionView {
        VersionView {
            key: self.key.clone(),
            payload: self.payload.clone(),
            begin_ts: self.begin_ts,
            end_ts: self.end_ts,
            deleted: self.deleted,
            created_by: self.created_by,
        }
    }
}

/// Append-only storage for every version ever written.
/// Nothing is removed: abort only unlinks versions from their chain.
#[derive(Debug, Default)]
pub struct VersionArena {
    versions: Vec<Version>,
}

impl VersionArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a version into the arena.
    pub fn alloc(&mut self, version: Version) -> VersionId {
        self.versions.push(version);
        VersionId(self.versions.len() - 1)
    }

    pub fn get(&self, id: VersionId) -> &Version {
        &self.versions[id.0]
    }

    pub fn get_mut(&mut self, id: VersionId) -> &mut Version {
        &mut self.versions[id.0]
    }

    /// Walk a chain from `head` toward older versions.
    pub fn chain(&self, head: VersionId) -> ChainIter<'_> {
        ChainIter {
            arena: self,
            next: Some(head),
        }
    }
}

/// Iterator over `(id, version)` pairs of one chain, newest first.
pub struct ChainIter<'a> {
    arena: &'a VersionArena,
    next: Option<VersionId>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = (VersionId, &'a Version);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let version = self.arena.get(id);
        self.next = version.older;
        Some((id, version))
    }
}

//! PALIMPSEST - Version Store Engine
//! Top-level module for the MVCC engine components.

pub mod concurrent;
pub mod metrics;
pub mod transaction;
pub mod vector;
pub mod version;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::error::{MvccError, Result};
use crate::types::{Key, Match, Payload, Timestamp, TxnId, VersionView};

use self::transaction::{TransactionTable, TxnStatus};
use self::version::{Version, VersionArena, VersionId};

/// Result of a single, non-blocking update attempt.
#[derive(Debug)]
pub enum UpdateAttempt {
    /// The new version is now the key's head.
    Linked,
    /// The head belongs to another transaction that is still active.
    /// Key and payload are handed back so the caller can retry.
    Blocked {
        blocker: TxnId,
        key: Key,
        payload: Payload,
    },
}

/// The single-threaded MVCC core.
/// Owns the key → head mapping, every version, and the transaction table.
/// `Store` wraps it for shared use across threads.
#[derive(Debug)]
pub struct MvccEngine {
    /// Head (newest) version of each key.
    heads: BTreeMap<Key, VersionId>,
    /// Storage for every version ever written.
    versions: VersionArena,
    /// Transaction table and ID counter.
    txns: TransactionTable,
    /// Engine configuration.
    config: Config,
}

impl MvccEngine {
    pub fn new(config: Config) -> Self {
        Self {
            heads: BTreeMap::new(),
            versions: VersionArena::new(),
            txns: TransactionTable::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a transaction and return its ID.
    pub fn begin(&mut self) -> TxnId {
        let id = self.txns.begin();
        log::debug!("T{} began", id);
        id
    }

    /// Install the first version of `key`.
    /// Fails if the key has any history at all, deleted heads included.
    pub fn insert(&mut self, txn: TxnId, key: Key, payload: Payload) -> Result<()> {
        let version = Version::new(txn, key, payload);

        if self.heads.contains_key(&version.key) {
            return Err(MvccError::AlreadyExists(version.key));
        }

        let key = version.key.clone();
        let id = self.versions.alloc(version);
        self.heads.insert(key.clone(), id);
        self.track_write(txn, id);

        log::debug!("T{} inserted {:?}", txn, String::from_utf8_lossy(&key));
        Ok(())
    }

    /// Try to link a new version on top of `key`'s head without waiting.
    ///
    /// A head created by another transaction that is still active cannot be
    /// built upon; the attempt returns `Blocked` and leaves state untouched.
    /// A transaction may always revise its own pending head.
    pub fn try_update(&mut self, txn: TxnId, key: Key, payload: Payload) -> Result<UpdateAttempt> {
        let mut version = Version::new(txn, key, payload);

        let head = match self.heads.get(&version.key) {
            Some(&head) => head,
            None => return Err(MvccError::KeyNotFound(version.key)),
        };

        let creator = self.versions.get(head).created_by;
        if creator != txn && self.txns.is_active(creator) {
            return Ok(UpdateAttempt::Blocked {
                blocker: creator,
                key: version.key,
                payload: version.payload,
            });
        }

        version.older = Some(head);
        let key = version.key.clone();
        let id = self.versions.alloc(version);
        self.heads.insert(key.clone(), id);
        self.track_write(txn, id);

        log::debug!("T{} updated {:?}", txn, String::from_utf8_lossy(&key));
        Ok(UpdateAttempt::Linked)
    }

    /// Close the validity of `key`'s head in place.
    /// No tombstone version is appended; the head itself becomes the tombstone.
    pub fn delete(&mut self, txn: TxnId, key: &[u8]) -> Result<()> {
        let head = *self
            .heads
            .get(key)
            .ok_or_else(|| MvccError::KeyNotFound(key.to_vec()))?;

        self.versions.get_mut(head).mark_deleted(txn);

        match self.txns.get_mut(txn) {
            Some(t) => t.deletes.push(head),
            None => log::warn!("delete by unknown transaction T{}", txn),
        }

        log::debug!("T{} deleted {:?}", txn, String::from_utf8_lossy(key));
        Ok(())
    }

    /// Commit `txn`: end the validity of every version it superseded exactly
    /// where its own version begins, then mark it committed.
    pub fn commit(&mut self, txn: TxnId) -> Result<()> {
        let t = self
            .txns
            .get_mut(txn)
            .ok_or(MvccError::TransactionNotFound(txn))?;

        match t.status {
            TxnStatus::Active => {}
            TxnStatus::Committed => return Ok(()),
            TxnStatus::Aborted => {
                return Err(MvccError::NotActive {
                    txn,
                    status: t.status,
                })
            }
        }

        for &id in &t.writes {
            let version = self.versions.get(id);
            if let Some(older) = version.older {
                let begin_ts = version.begin_ts;
                self.versions.get_mut(older).supersede(begin_ts);
            }
        }
        t.status = TxnStatus::Committed;

        log::info!("T{} committed ({} versions)", txn, t.writes.len());
        Ok(())
    }

    /// Abort `txn`: undo its in-place deletes, unlink every version it
    /// created, and mark it aborted. A key left with no versions disappears.
    pub fn abort(&mut self, txn: TxnId) -> Result<()> {
        let t = self
            .txns
            .get_mut(txn)
            .ok_or(MvccError::TransactionNotFound(txn))?;

        match t.status {
            TxnStatus::Active => {}
            TxnStatus::Aborted => return Ok(()),
            TxnStatus::Committed => {
                return Err(MvccError::NotActive {
                    txn,
                    status: t.status,
                })
            }
        }

        // Other deleters and committed successors keep their stamps.
        for &id in t.deletes.iter().rev() {
            self.versions.get_mut(id).undo_delete(txn);
        }

        let touched: BTreeSet<Key> = t
            .writes
            .iter()
            .map(|&id| self.versions.get(id).key.clone())
            .collect();
        t.status = TxnStatus::Aborted;
        let unlinked = t.writes.len();

        for key in touched {
            self.unlink_created_by(txn, key);
        }

        log::info!("T{} aborted ({} versions unlinked)", txn, unlinked);
        Ok(())
    }

    /// Snapshot read at logical time `as_of`: at most one visible version
    /// per key, in key order.
    pub fn read(&self, as_of: Timestamp) -> Vec<VersionView> {
        self.heads
            .values()
            .filter_map(|&head| self.visible_in_chain(head, as_of))
            .map(Version::view)
            .collect()
    }

    /// Similarity read at `as_of`: the `k` visible versions whose embedding
    /// is closest to `query` by cosine distance, closest first.
    /// Versions without an embedding are never returned.
    pub fn read_top_k(&self, as_of: Timestamp, query: &[f32], k: usize) -> Vec<Match> {
        let scored: Vec<(VersionView, f32)> = self
            .heads
            .values()
            .filter_map(|&head| self.visible_in_chain(head, as_of))
            .filter_map(|version| {
                let embedding = version.payload.vector.as_deref()?;
                Some((version.view(), vector::cosine_distance(embedding, query)))
            })
            .collect();

        vector::top_k_by_distance(scored, k)
            .into_iter()
            .map(|(view, distance)| Match { view, distance })
            .collect()
    }

    /// Every version of `key`, newest first, without visibility filtering.
    pub fn history(&self, key: &[u8]) -> Vec<VersionView> {
        match self.heads.get(key) {
            Some(&head) => self.versions.chain(head).map(|(_, v)| v.view()).collect(),
            None => Vec::new(),
        }
    }

    pub fn status(&self, txn: TxnId) -> Option<TxnStatus> {
        self.txns.status(txn)
    }

    /// Most recently issued transaction ID (0 before the first `begin`).
    pub fn last_txn_id(&self) -> TxnId {
        self.txns.last_id()
    }

    /// Number of keys with a version chain.
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    fn track_write(&mut self, txn: TxnId, id: VersionId) {
        match self.txns.get_mut(txn) {
            Some(t) => t.writes.push(id),
            None => log::warn!("write by unknown transaction T{}", txn),
        }
    }

    fn visible_in_chain(&self, head: VersionId, as_of: Timestamp) -> Option<&Version> {
        for (_, version) in self.versions.chain(head) {
            match self.txns.status(version.created_by) {
                Some(TxnStatus::Committed) => {}
                Some(TxnStatus::Active)
                    if self.config.read_own_writes && version.created_by == as_of =>
                {
                    // Our own pending delete hides the key from ourselves.
                    if version.deleted {
                        return None;
                    }
                }
                _ => continue,
            }

            if version.covers(as_of) && !version.deleted {
                return Some(version);
            }
        }
        None
    }

    fn unlink_created_by(&mut self, txn: TxnId, key: Key) {
        let Some(&head) = self.heads.get(&key) else {
            return;
        };

        let kept: Vec<VersionId> = self
            .versions
            .chain(head)
            .filter(|(_, v)| v.created_by != txn)
            .map(|(id, _)| id)
            .collect();

        for (i, &id) in kept.iter().enumerate() {
            self.versions.get_mut(id).older = kept.get(i + 1).copied();
        }

        match kept.first() {
            Some(&new_head) => {
                self.heads.insert(key, new_head);
            }
            None => {
                self.heads.remove(&key);
            }
        }
    }
}

impl Default for MvccEngine {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(v: &'static str) -> Payload {
        Payload::new(v)
    }

    fn values(views: &[VersionView]) -> Vec<(String, String)> {
        views
            .iter()
            .map(|v| {
                (
                    String::from_utf8_lossy(&v.key).into_owned(),
                    String::from_utf8_lossy(&v.payload.value).into_owned(),
                )
            })
            .collect()
    }

    fn linked(attempt: UpdateAttempt) -> bool {
        matches!(attempt, UpdateAttempt::Linked)
    }

    #[test]
    fn test_insert_commit_read() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("p1")).unwrap();

        assert!(engine.read(t1).is_empty(), "pending insert is invisible");
        engine.commit(t1).unwrap();
        assert_eq!(values(&engine.read(t1)), vec![("a".into(), "p1".into())]);
        assert!(engine.read(0).is_empty());
    }

    #[test]
    fn test_insert_existing_key_fails() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("p1")).unwrap();
        let err = engine.insert(t1, b"a".to_vec(), payload("p2")).unwrap_err();
        assert_eq!(err, MvccError::AlreadyExists(b"a".to_vec()));
        assert_eq!(engine.history(b"a").len(), 1);
    }

    #[test]
    fn test_update_missing_key() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        let err = engine.try_update(t1, b"nope".to_vec(), payload("x")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_blocked_by_foreign_pending_head() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        let t2 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("p1")).unwrap();

        match engine.try_update(t2, b"a".to_vec(), payload("p2")).unwrap() {
            UpdateAttempt::Blocked { blocker, key, payload } => {
                assert_eq!(blocker, t1);
                assert_eq!(key, b"a".to_vec());
                assert_eq!(payload.value, "p2");
            }
            UpdateAttempt::Linked => panic!("must not link atop a pending head"),
        }
        assert_eq!(engine.history(b"a").len(), 1);

        engine.commit(t1).unwrap();
        assert!(linked(engine.try_update(t2, b"a".to_vec(), payload("p2")).unwrap()));
    }

    #[test]
    fn test_self_update_is_exempt() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("p1")).unwrap();
        assert!(linked(engine.try_update(t1, b"a".to_vec(), payload("p2")).unwrap()));
        assert!(linked(engine.try_update(t1, b"a".to_vec(), payload("p3")).unwrap()));
        engine.commit(t1).unwrap();

        assert_eq!(values(&engine.read(t1)), vec![("a".into(), "p3".into())]);
        let history = engine.history(b"a");
        assert_eq!(history.len(), 3);
        // Intermediate revisions collapse to empty intervals.
        assert_eq!((history[1].begin_ts, history[1].end_ts), (t1, t1));
        assert_eq!((history[2].begin_ts, history[2].end_ts), (t1, t1));
    }

    #[test]
    fn test_commit_stamps_superseded_version() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        engine.try_update(t2, b"a".to_vec(), payload("v2")).unwrap();
        assert_eq!(engine.history(b"a")[1].end_ts, crate::types::TS_INFINITY);

        engine.commit(t2).unwrap();
        let history = engine.history(b"a");
        assert_eq!(history[1].end_ts, t2);
        assert_eq!(values(&engine.read(t2)), vec![("a".into(), "v2".into())]);
        assert_eq!(values(&engine.read(t1)), vec![("a".into(), "v1".into())]);
    }

    #[test]
    fn test_delete_is_in_place() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        engine.delete(t2, b"a").unwrap();
        let history = engine.history(b"a");
        assert_eq!(history.len(), 1);
        assert!(history[0].deleted);
        assert_eq!(history[0].end_ts, t2);

        engine.commit(t2).unwrap();
        assert!(engine.read(t2).is_empty());
        assert!(engine.read(t2 + 10).is_empty());
        assert!(engine.delete(t2, b"missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_commit_unknown_transaction() {
        let mut engine = MvccEngine::default();
        assert_eq!(engine.commit(9), Err(MvccError::TransactionNotFound(9)));
        assert_eq!(engine.abort(9), Err(MvccError::TransactionNotFound(9)));
    }

    #[test]
    fn test_recommit_is_noop() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.commit(t1).unwrap();
        engine.commit(t1).unwrap();
        assert_eq!(engine.status(t1), Some(TxnStatus::Committed));
    }

    #[test]
    fn test_abort_unlinks_versions() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        engine.try_update(t2, b"a".to_vec(), payload("v2")).unwrap();
        engine.insert(t2, b"b".to_vec(), payload("b1")).unwrap();
        engine.abort(t2).unwrap();

        assert_eq!(engine.status(t2), Some(TxnStatus::Aborted));
        assert_eq!(engine.history(b"a").len(), 1);
        assert!(engine.history(b"b").is_empty());
        assert_eq!(engine.len(), 1);

        // The key vacated by the aborted insert can be inserted again.
        let t3 = engine.begin();
        engine.insert(t3, b"b".to_vec(), payload("b2")).unwrap();
        engine.commit(t3).unwrap();
        assert_eq!(
            values(&engine.read(t3)),
            vec![("a".into(), "v1".into()), ("b".into(), "b2".into())]
        );
    }

    #[test]
    fn test_abort_restores_deleted_head() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        engine.delete(t2, b"a").unwrap();
        assert!(engine.read(t2).is_empty());
        engine.abort(t2).unwrap();

        let history = engine.history(b"a");
        assert!(!history[0].deleted);
        assert_eq!(history[0].end_ts, crate::types::TS_INFINITY);
        assert_eq!(values(&engine.read(t2)), vec![("a".into(), "v1".into())]);
    }

    #[test]
    fn test_concurrent_deleters_abort_in_begin_order() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        let t3 = engine.begin();
        engine.delete(t2, b"a").unwrap();
        engine.delete(t3, b"a").unwrap();

        engine.abort(t2).unwrap();
        assert!(engine.history(b"a")[0].deleted, "T3 still holds its delete");
        assert!(engine.read(t3).is_empty());

        engine.abort(t3).unwrap();
        let history = engine.history(b"a");
        assert!(!history[0].deleted);
        assert_eq!(history[0].end_ts, crate::types::TS_INFINITY);
        assert_eq!(values(&engine.read(t3 + 1)), vec![("a".into(), "v1".into())]);
    }

    #[test]
    fn test_concurrent_deleters_abort_in_reverse_order() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        let t3 = engine.begin();
        engine.delete(t2, b"a").unwrap();
        engine.delete(t3, b"a").unwrap();

        engine.abort(t3).unwrap();
        let history = engine.history(b"a");
        assert!(history[0].deleted);
        assert_eq!(history[0].end_ts, t2);

        engine.abort(t2).unwrap();
        let history = engine.history(b"a");
        assert!(!history[0].deleted);
        assert_eq!(history[0].end_ts, crate::types::TS_INFINITY);
        assert_eq!(values(&engine.read(t3)), vec![("a".into(), "v1".into())]);
    }

    #[test]
    fn test_abort_delete_keeps_committed_successor_stamp() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        let t3 = engine.begin();
        engine.delete(t2, b"a").unwrap();
        assert!(linked(engine.try_update(t3, b"a".to_vec(), payload("v3")).unwrap()));
        engine.commit(t3).unwrap();
        engine.abort(t2).unwrap();

        let history = engine.history(b"a");
        assert_eq!(history.len(), 2);
        assert!(!history[1].deleted);
        assert_eq!(history[1].end_ts, t3);
        assert_eq!(values(&engine.read(t2)), vec![("a".into(), "v1".into())]);
        assert_eq!(values(&engine.read(t3)), vec![("a".into(), "v3".into())]);
    }

    #[test]
    fn test_terminal_states() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        let t2 = engine.begin();
        engine.commit(t1).unwrap();
        engine.abort(t2).unwrap();
        engine.abort(t2).unwrap();

        assert_eq!(
            engine.abort(t1),
            Err(MvccError::NotActive { txn: t1, status: TxnStatus::Committed })
        );
        assert_eq!(
            engine.commit(t2),
            Err(MvccError::NotActive { txn: t2, status: TxnStatus::Aborted })
        );
    }

    #[test]
    fn test_aborted_head_does_not_block() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        let t3 = engine.begin();
        engine.try_update(t2, b"a".to_vec(), payload("v2")).unwrap();
        assert!(!linked(engine.try_update(t3, b"a".to_vec(), payload("v3")).unwrap()));
        engine.abort(t2).unwrap();
        assert!(linked(engine.try_update(t3, b"a".to_vec(), payload("v3")).unwrap()));
        engine.commit(t3).unwrap();

        let history = engine.history(b"a");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].end_ts, t3);
    }

    #[test]
    fn test_unknown_creator_is_invisible() {
        let mut engine = MvccEngine::default();
        engine.insert(77, b"ghost".to_vec(), payload("boo")).unwrap();
        assert!(engine.read(100).is_empty());

        // An unknown creator is not active, so updates proceed.
        let t1 = engine.begin();
        assert!(linked(engine.try_update(t1, b"ghost".to_vec(), payload("x")).unwrap()));
    }

    #[test]
    fn test_read_top_k_ranks_visible_versions() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("x").with_vector(vec![1.0, 0.0])).unwrap();
        engine.insert(t1, b"b".to_vec(), payload("y").with_vector(vec![0.0, 1.0])).unwrap();
        engine.insert(t1, b"c".to_vec(), payload("z").with_vector(vec![0.9, 0.1])).unwrap();
        engine.insert(t1, b"d".to_vec(), payload("no vector")).unwrap();
        engine.commit(t1).unwrap();

        let top = engine.read_top_k(t1, &[1.0, 0.0], 2);
        let keys: Vec<&[u8]> = top.iter().map(|m| m.view.key.as_slice()).collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"c".as_slice()]);
        assert!(top[0].distance < top[1].distance);

        // k beyond the visible count returns every embedded version.
        let all = engine.read_top_k(t1, &[1.0, 0.0], 10);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].view.key, b"b".to_vec());
        assert!(engine.read_top_k(t1, &[1.0, 0.0], 0).is_empty());
    }

    #[test]
    fn test_read_top_k_respects_snapshot() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1").with_vector(vec![1.0, 0.0])).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        engine.try_update(t2, b"a".to_vec(), payload("v2").with_vector(vec![0.0, 1.0])).unwrap();
        engine.insert(t2, b"b".to_vec(), payload("b1").with_vector(vec![1.0, 0.0])).unwrap();

        let pending = engine.read_top_k(t2, &[0.0, 1.0], 5);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].view.payload.value, "v1");

        engine.commit(t2).unwrap();
        let top = engine.read_top_k(t2, &[0.0, 1.0], 1);
        assert_eq!(top[0].view.payload.value, "v2");
        assert!(top[0].distance.abs() < 1e-6);
        assert_eq!(engine.read_top_k(t1, &[0.0, 1.0], 5)[0].view.payload.value, "v1");
    }

    #[test]
    fn test_own_writes_hidden_by_default() {
        let mut engine = MvccEngine::default();
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("mine")).unwrap();
        assert!(engine.read(t1).is_empty());
    }

    #[test]
    fn test_own_writes_visible_when_enabled() {
        let mut engine = MvccEngine::new(Config::new().with_read_own_writes(true));
        let t1 = engine.begin();
        engine.insert(t1, b"a".to_vec(), payload("v1")).unwrap();
        engine.commit(t1).unwrap();

        let t2 = engine.begin();
        let t3 = engine.begin();
        engine.try_update(t2, b"a".to_vec(), payload("v2")).unwrap();
        engine.insert(t2, b"b".to_vec(), payload("b1")).unwrap();

        assert_eq!(
            values(&engine.read(t2)),
            vec![("a".into(), "v2".into()), ("b".into(), "b1".into())]
        );
        // Other readers still see only committed state.
        assert_eq!(values(&engine.read(t3)), vec![("a".into(), "v1".into())]);

        engine.delete(t2, b"b").unwrap();
        assert_eq!(values(&engine.read(t2)), vec![("a".into(), "v2".into())]);
    }
}

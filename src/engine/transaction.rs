//! PALIMPSEST - Transactions
//! A transaction is identified by a monotonically increasing ID that also
//! serves as its logical timestamp. Its status decides whether the versions
//! it created are visible to readers.

use std::collections::HashMap;

use super::version::VersionId;
use crate::types::TxnId;

/// Lifecycle state. `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

#[derive(Debug)]
pub struct Transaction {
    pub status: TxnStatus,
    /// Versions created by this transaction, in write order.
    pub writes: Vec<VersionId>,
    /// Versions this transaction deleted in place, in write order.
    pub deletes: Vec<VersionId>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            status: TxnStatus::Active,
            writes: Vec::new(),
            deletes: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TxnStatus::Active
    }
}

/// Transaction table plus the ID counter. IDs start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct TransactionTable {
    txns: HashMap<TxnId, Transaction>,
    last_id: TxnId,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next ID and register an active transaction under it.
    pub fn begin(&mut self) -> TxnId {
        self.last_id += 1;
        self.txns.insert(self.last_id, Transaction::new());
        self.last_id
    }

    pub fn last_id(&self) -> TxnId {
        self.last_id
    }

    pub fn get_mut(&mut self, id: TxnId) -> Option<&mut Transaction> {
        self.txns.get_mut(&id)
    }

    pub fn status(&self, id: TxnId) -> Option<TxnStatus> {
        self.txns.get(&id).map(|t| t.status)
    }

    /// True only when `id` is known and still `Active`.
    pub fn is_active(&self, id: TxnId) -> bool {
        self.txns.get(&id).is_some_and(Transaction::is_active)
    }
}

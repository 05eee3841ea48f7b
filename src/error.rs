//! PALIMPSEST - Custom Error Types
//! Defines the error hierarchy for the version store.

use thiserror::Error;

use crate::engine::transaction::TxnStatus;
use crate::types::TxnId;

/// Custom Result type for the store.
pub type Result<T> = std::result::Result<T, MvccError>;

/// Error types for the version store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MvccError {
    /// Insert on a key that already has version history (deleted or not).
    #[error("record with key {} already exists", String::from_utf8_lossy(.0))]
    AlreadyExists(Vec<u8>),

    /// Update or delete on a key with no version chain.
    #[error("record with key {} not found", String::from_utf8_lossy(.0))]
    KeyNotFound(Vec<u8>),

    /// Commit or abort of a transaction the store never issued.
    #[error("transaction {0} not found")]
    TransactionNotFound(TxnId),

    /// Commit of an aborted transaction, or abort of a committed one.
    #[error("transaction {txn} is {status:?}")]
    NotActive { txn: TxnId, status: TxnStatus },

    /// A bounded wait on another transaction's write expired.
    #[error("transaction {txn} timed out waiting on transaction {blocker}")]
    WaitTimeout { txn: TxnId, blocker: TxnId },

    /// Serialization of a snapshot failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed shell command.
    #[error("{0}")]
    Command(String),
}

impl MvccError {
    /// True for both flavours of "not found" (key or transaction).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MvccError::KeyNotFound(_) | MvccError::TransactionNotFound(_)
        )
    }
}

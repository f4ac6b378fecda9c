//! Ledger storage errors.

use thiserror::Error;

/// Errors from a [`super::Storage`] backend.
///
/// Every variant means the transaction did not commit. The engine drops the
/// event that triggered it and leaves repair to reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O or transaction failure. Usually transient.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored key or value has an impossible shape.
    #[error("corrupt ledger entry: {0}")]
    Corrupt(String),

    /// A thread panicked while holding the in-memory ledger lock.
    #[error("ledger lock poisoned")]
    Poisoned,
}

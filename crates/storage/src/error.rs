/// All errors that can be returned by a `HistoryLedger` implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// An entry with this key is already in the ledger. Guards against
    /// double-commit on retry.
    #[error("duplicate ledger key: {key}")]
    DuplicateKey { key: String },

    /// The durability write did not finish within the caller's bound.
    /// Nothing was published; the append is safe to retry.
    #[error("ledger append for {key} timed out after {after_ms} ms")]
    Timeout { key: String, after_ms: u64 },

    /// A persisted row could not be decoded.
    #[error("corrupt ledger row at line {line}: {reason}")]
    Corrupt { line: u64, reason: String },

    /// A backend-specific storage error (I/O, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Backend(e.to_string())
    }
}

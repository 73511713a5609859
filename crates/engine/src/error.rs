use restock_core::{QuantityError, RecordKey};
use restock_storage::StorageError;

/// Errors returned by lifecycle operations.
///
/// Every variant is scoped to one record or one call; none leaves the open
/// set or the ledger in a partially updated state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The on-hand value was rejected; the record keeps its prior value.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),

    #[error("record {key} is not in the open set")]
    NotFound { key: RecordKey },

    /// Commit was requested for a record that is open but not staged.
    #[error("record {key} is not staged for fulfilment")]
    NotStaged { key: RecordKey },

    /// The ledger already holds an entry for this key.
    #[error("record {key} is already in the history ledger")]
    DuplicateKey { key: String },

    /// The ledger write did not finish in time. The record stays open and
    /// staged and can be retried.
    #[error("ledger write for {key} timed out after {after_ms} ms")]
    Timeout { key: String, after_ms: u64 },

    /// Any other ledger failure on a single append.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::DuplicateKey { key } => EngineError::DuplicateKey { key },
            StorageError::Timeout { key, after_ms } => EngineError::Timeout { key, after_ms },
            other => EngineError::Storage(other.to_string()),
        }
    }
}

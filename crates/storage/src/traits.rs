use std::time::Duration;

use async_trait::async_trait;
use restock_core::RecordKey;
use time::Date;

use crate::entry::LedgerEntry;
use crate::error::StorageError;
use crate::index::LedgerRange;

/// The storage trait for the history of fulfilled records.
///
/// A `HistoryLedger` is append-only: entries are never edited or removed
/// once written.
///
/// ## Duplicate Detection
///
/// `append` refuses an entry whose key is already present with
/// `StorageError::DuplicateKey`. This is what makes a retried commit
/// idempotent: the second attempt is rejected instead of writing a second
/// row.
///
/// ## Durability
///
/// An `Ok(())` from `append` means the entry has reached stable storage and
/// will be returned by `query_range` after a process restart. A backend that
/// cannot finish within `timeout` returns `StorageError::Timeout` and must
/// not publish the entry, even if the underlying write lands later.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so a ledger can be shared
/// across tasks behind an `Arc`.
#[async_trait]
pub trait HistoryLedger: Send + Sync + 'static {
    /// Durably append one entry.
    async fn append(&self, entry: LedgerEntry, timeout: Duration) -> Result<(), StorageError>;

    /// Whether an entry with this key exists.
    async fn contains(&self, key: &RecordKey) -> Result<bool, StorageError>;

    /// Entries whose UTC fulfilment date lies in `[start, end]` inclusive,
    /// ordered by `fulfilled_at` then key.
    async fn query_range(&self, start: Date, end: Date) -> Result<LedgerRange, StorageError>;

    /// Earliest and latest fulfilment dates, or `None` for an empty ledger.
    async fn bounds(&self) -> Result<Option<(Date, Date)>, StorageError>;

    /// Number of entries.
    async fn len(&self) -> Result<usize, StorageError>;
}

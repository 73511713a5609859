use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use restock_core::RecordKey;
use time::Date;

use crate::entry::LedgerEntry;
use crate::error::StorageError;
use crate::index::{LedgerIndex, LedgerRange};
use crate::traits::HistoryLedger;

/// Volatile ledger kept entirely in memory.
///
/// Satisfies every `HistoryLedger` guarantee except surviving a restart.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    index: RwLock<Arc<LedgerIndex>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger preloaded with `index`.
    pub fn from_index(index: LedgerIndex) -> Self {
        MemoryLedger {
            index: RwLock::new(Arc::new(index)),
        }
    }

    fn snapshot(&self) -> Result<Arc<LedgerIndex>, StorageError> {
        self.index
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| StorageError::Backend("memory ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl HistoryLedger for MemoryLedger {
    async fn append(&self, entry: LedgerEntry, _timeout: Duration) -> Result<(), StorageError> {
        let mut guard = self
            .index
            .write()
            .map_err(|_| StorageError::Backend("memory ledger lock poisoned".to_string()))?;
        if guard.contains(&entry.key) {
            return Err(StorageError::DuplicateKey {
                key: entry.key.to_string(),
            });
        }
        Arc::make_mut(&mut *guard).insert(entry)
    }

    async fn contains(&self, key: &RecordKey) -> Result<bool, StorageError> {
        Ok(self.snapshot()?.contains(key))
    }

    async fn query_range(&self, start: Date, end: Date) -> Result<LedgerRange, StorageError> {
        Ok(LedgerRange::new(self.snapshot()?, start, end))
    }

    async fn bounds(&self) -> Result<Option<(Date, Date)>, StorageError> {
        Ok(self.snapshot()?.bounds())
    }

    async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.snapshot()?.len())
    }
}

//! In-memory ordered index over ledger entries, shared by every backend.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use restock_core::RecordKey;
use time::{Date, OffsetDateTime, Time, UtcOffset};

use crate::entry::LedgerEntry;
use crate::error::StorageError;

/// Entries ordered by `fulfilled_at`, then by key.
///
/// Backends hold this behind an `Arc` and copy-on-write when appending, so
/// a [`LedgerRange`] handed to a reader is a stable snapshot.
#[derive(Debug, Clone, Default)]
pub struct LedgerIndex {
    by_time: BTreeMap<OffsetDateTime, BTreeMap<RecordKey, LedgerEntry>>,
    keys: HashSet<RecordKey>,
}

impl LedgerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Insert an entry, refusing a key that is already present.
    pub fn insert(&mut self, mut entry: LedgerEntry) -> Result<(), StorageError> {
        entry.fulfilled_at = entry.fulfilled_at.to_offset(UtcOffset::UTC);
        if self.keys.contains(&entry.key) {
            return Err(StorageError::DuplicateKey {
                key: entry.key.to_string(),
            });
        }
        self.keys.insert(entry.key.clone());
        self.by_time
            .entry(entry.fulfilled_at)
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    /// Earliest and latest fulfilment dates (UTC), if any entries exist.
    pub fn bounds(&self) -> Option<(Date, Date)> {
        let first = self.by_time.keys().next()?;
        let last = self.by_time.keys().next_back()?;
        Some((first.date(), last.date()))
    }
}

/// Lazy, restartable view of the entries fulfilled within a date range.
///
/// Holds a snapshot of the index taken when the query was made; appends
/// that happen afterwards are not visible through it.
#[derive(Debug, Clone)]
pub struct LedgerRange {
    index: Arc<LedgerIndex>,
    lower: Bound<OffsetDateTime>,
    upper: Bound<OffsetDateTime>,
    empty: bool,
}

impl LedgerRange {
    /// Entries whose UTC fulfilment date lies in `[start, end]`.
    pub fn new(index: Arc<LedgerIndex>, start: Date, end: Date) -> Self {
        let lower = Bound::Included(start.with_time(Time::MIDNIGHT).assume_utc());
        let upper = match end.next_day() {
            Some(next) => Bound::Excluded(next.with_time(Time::MIDNIGHT).assume_utc()),
            None => Bound::Unbounded,
        };
        LedgerRange {
            index,
            lower,
            upper,
            empty: start > end,
        }
    }

    /// Iterate from the start. Each call begins a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> + '_ {
        let range = if self.empty {
            None
        } else {
            Some(self.index.by_time.range((self.lower, self.upper)))
        };
        range
            .into_iter()
            .flatten()
            .flat_map(|(_, by_key)| by_key.values())
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn to_vec(&self) -> Vec<LedgerEntry> {
        self.iter().cloned().collect()
    }
}

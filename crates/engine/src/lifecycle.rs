//! The lifecycle engine: sole owner of the open set.
//!
//! Records enter the open set through [`LifecycleEngine::seed`] (or
//! [`LifecycleEngine::restore`]), are edited and staged in place, and leave
//! it only through [`LifecycleEngine::commit_batch`], which appends each
//! staged record to the history ledger before removing it.
//!
//! ## Locking
//!
//! The open set sits behind a synchronous mutex that is never held across
//! an `.await`. Moves into the ledger and seeding are additionally
//! serialized per key by an async mutex, so for any one key the sequence
//! "check ledger, insert into open set" and "append to ledger, remove from
//! open set" never interleave.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use restock_core::alert::{self, AlertKind, AlertSummary, Thresholds};
use restock_core::{filter, gap, QuantityBounds, Record, RecordKey, Status};
use restock_storage::{HistoryLedger, LedgerEntry, LedgerRange};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Default bound on a single ledger append.
pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a [`LifecycleEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub bounds: QuantityBounds,
    pub thresholds: Thresholds,
    pub append_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            bounds: QuantityBounds::default(),
            thresholds: Thresholds::default(),
            append_timeout: DEFAULT_APPEND_TIMEOUT,
        }
    }
}

/// One entry of the open set: an open record plus its staged flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSlot {
    pub record: Record,
    /// Marked for fulfilment by the next commit. The record itself stays
    /// `Open` until the commit writes it to the ledger.
    #[serde(default)]
    pub staged: bool,
}

impl OpenSlot {
    pub fn new(record: Record) -> Self {
        OpenSlot {
            record,
            staged: false,
        }
    }
}

/// Outcome of [`LifecycleEngine::commit_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Keys now in the ledger and gone from the open set, in request order.
    pub moved: Vec<RecordKey>,
    /// Keys left untouched, with the reason.
    pub failed: Vec<(RecordKey, EngineError)>,
}

/// Outcome of [`LifecycleEngine::seed`] and [`LifecycleEngine::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub seeded: Vec<RecordKey>,
    /// Already fulfilled; a ledger entry exists for the key.
    pub in_ledger: Vec<RecordKey>,
    /// Already present in the open set.
    pub duplicates: Vec<RecordKey>,
    /// Offered records whose status was not `Open`.
    pub not_open: Vec<RecordKey>,
}

enum Admission {
    Seeded,
    InLedger,
    Duplicate,
}

/// Owns the open set and moves fulfilled records into a [`HistoryLedger`].
pub struct LifecycleEngine<L: HistoryLedger> {
    ledger: Arc<L>,
    config: EngineConfig,
    open: Mutex<IndexMap<RecordKey, OpenSlot>>,
    key_locks: Mutex<HashMap<RecordKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<L: HistoryLedger> LifecycleEngine<L> {
    pub fn new(ledger: Arc<L>, config: EngineConfig) -> Self {
        LifecycleEngine {
            ledger,
            config,
            open: Mutex::new(IndexMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Edits ───────────────────────────────────────────────────────────────

    /// Set a record's on-hand quantity and recompute its gap.
    ///
    /// A rejected value leaves the record exactly as it was.
    pub fn update_on_hand(&self, key: &RecordKey, on_hand: i64) -> Result<Record, EngineError> {
        let mut open = self.open_set();
        let slot = open
            .get_mut(key)
            .ok_or_else(|| EngineError::NotFound { key: key.clone() })?;
        let next = gap::recompute(&slot.record, on_hand, &self.config.bounds)?;
        debug!(%key, on_hand, gap = %next.gap(), "on-hand updated");
        slot.record = next.clone();
        Ok(next)
    }

    /// Stage (`Fulfilled`) or un-stage (`Open`) a record for the next commit.
    ///
    /// Neither removes the record nor touches the ledger.
    pub fn set_status(&self, key: &RecordKey, status: Status) -> Result<(), EngineError> {
        let mut open = self.open_set();
        let slot = open
            .get_mut(key)
            .ok_or_else(|| EngineError::NotFound { key: key.clone() })?;
        slot.staged = status == Status::Fulfilled;
        debug!(%key, staged = slot.staged, "status set");
        Ok(())
    }

    // ── Commit ──────────────────────────────────────────────────────────────

    /// Move every listed staged record into the ledger, stamped `now`.
    ///
    /// Keys are processed one at a time in the given order; a key listed
    /// twice is processed once. Each move runs on its own task, so dropping
    /// the returned future leaves finished moves in place, lets the move in
    /// progress run to completion, and leaves the remaining keys untouched.
    pub async fn commit_batch<I>(self: &Arc<Self>, keys: I, now: OffsetDateTime) -> CommitReport
    where
        I: IntoIterator<Item = RecordKey>,
    {
        let mut report = CommitReport::default();
        let mut seen = HashSet::new();

        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            let engine = Arc::clone(self);
            let task_key = key.clone();
            let outcome = tokio::spawn(async move { engine.commit_one(&task_key, now).await })
                .await
                .unwrap_or_else(|e| Err(EngineError::Storage(format!("commit task failed: {e}"))));

            match outcome {
                Ok(()) => report.moved.push(key),
                Err(e) => {
                    warn!(%key, error = %e, "record not committed");
                    report.failed.push((key, e));
                }
            }
        }

        info!(
            moved = report.moved.len(),
            failed = report.failed.len(),
            "commit batch finished"
        );
        report
    }

    async fn commit_one(&self, key: &RecordKey, now: OffsetDateTime) -> Result<(), EngineError> {
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.move_to_ledger(key, now).await
        };
        self.release_key_lock(key, lock);
        result
    }

    /// Caller holds the key lock.
    async fn move_to_ledger(&self, key: &RecordKey, now: OffsetDateTime) -> Result<(), EngineError> {
        let record = {
            let open = self.open_set();
            let slot = open
                .get(key)
                .ok_or_else(|| EngineError::NotFound { key: key.clone() })?;
            if !slot.staged {
                return Err(EngineError::NotStaged { key: key.clone() });
            }
            slot.record.clone()
        };

        let fulfilled = record
            .clone()
            .into_fulfilled(now)
            .map_err(|r| EngineError::Storage(format!("record {} is not open", r.key())))?;
        let entry = LedgerEntry::try_from(fulfilled)
            .map_err(|r| EngineError::Storage(format!("record {} is not fulfilled", r.key())))?;

        // On any failure, including DuplicateKey, the record stays open and
        // staged for the operator to retry or investigate.
        self.ledger
            .append(entry, self.config.append_timeout)
            .await?;

        self.remove_open(key, &record);
        info!(%key, "record fulfilled");
        Ok(())
    }

    fn remove_open(&self, key: &RecordKey, committed: &Record) {
        let removed = self.open_set().shift_remove(key);
        if let Some(slot) = removed {
            if slot.record != *committed {
                warn!(%key, "edit made during commit was not recorded in the ledger");
            }
        }
    }

    // ── Seeding ─────────────────────────────────────────────────────────────

    /// Add freshly ingested records to the open set.
    ///
    /// Keys already in the ledger or already open are skipped and reported.
    /// Fails only if the ledger cannot be consulted; records admitted before
    /// the failure stay admitted.
    pub async fn seed<I>(&self, records: I) -> Result<SeedReport, EngineError>
    where
        I: IntoIterator<Item = Record>,
    {
        let report = self
            .admit_all(records.into_iter().map(OpenSlot::new))
            .await?;
        info!(
            seeded = report.seeded.len(),
            in_ledger = report.in_ledger.len(),
            duplicates = report.duplicates.len(),
            "open set seeded"
        );
        Ok(report)
    }

    /// Reload a persisted working set, keeping staged flags.
    pub async fn restore<I>(&self, slots: I) -> Result<SeedReport, EngineError>
    where
        I: IntoIterator<Item = OpenSlot>,
    {
        let report = self.admit_all(slots).await?;
        if !report.in_ledger.is_empty() {
            info!(
                count = report.in_ledger.len(),
                "dropped working-set records already in the ledger"
            );
        }
        Ok(report)
    }

    async fn admit_all<I>(&self, slots: I) -> Result<SeedReport, EngineError>
    where
        I: IntoIterator<Item = OpenSlot>,
    {
        let mut report = SeedReport::default();
        for slot in slots {
            let key = slot.record.key().clone();
            if !slot.record.is_open() {
                report.not_open.push(key);
                continue;
            }

            let lock = self.key_lock(&key);
            let admitted = {
                let _guard = lock.lock().await;
                self.admit(slot).await
            };
            self.release_key_lock(&key, lock);

            match admitted? {
                Admission::Seeded => report.seeded.push(key),
                Admission::InLedger => report.in_ledger.push(key),
                Admission::Duplicate => {
                    warn!(%key, "duplicate record skipped");
                    report.duplicates.push(key);
                }
            }
        }
        Ok(report)
    }

    /// Caller holds the key lock.
    async fn admit(&self, slot: OpenSlot) -> Result<Admission, EngineError> {
        let key = slot.record.key().clone();
        if self.ledger.contains(&key).await? {
            return Ok(Admission::InLedger);
        }
        let mut open = self.open_set();
        if open.contains_key(&key) {
            return Ok(Admission::Duplicate);
        }
        open.insert(key, slot);
        Ok(Admission::Seeded)
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    pub fn get(&self, key: &RecordKey) -> Option<OpenSlot> {
        self.open_set().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.open_set().len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_set().is_empty()
    }

    /// Copy of the open set, in insertion order.
    pub fn snapshot(&self) -> Vec<OpenSlot> {
        self.open_set().values().cloned().collect()
    }

    /// Open records, in insertion order.
    pub fn records(&self) -> Vec<Record> {
        self.open_set().values().map(|s| s.record.clone()).collect()
    }

    pub fn staged_keys(&self) -> Vec<RecordKey> {
        self.open_set()
            .values()
            .filter(|s| s.staged)
            .map(|s| s.record.key().clone())
            .collect()
    }

    /// Open records matching both substrings, case-insensitively.
    pub fn filter(&self, location: &str, product: &str) -> Vec<Record> {
        let open = self.open_set();
        filter::filter(open.values().map(|s| &s.record), location, product)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn alerts(&self, key: &RecordKey) -> Result<BTreeSet<AlertKind>, EngineError> {
        let open = self.open_set();
        let slot = open
            .get(key)
            .ok_or_else(|| EngineError::NotFound { key: key.clone() })?;
        Ok(alert::evaluate(&slot.record, &self.config.thresholds))
    }

    pub fn alert_summary(&self) -> AlertSummary {
        let open = self.open_set();
        alert::summarize(open.values().map(|s| &s.record), &self.config.thresholds)
    }

    /// Open records under the low-stock threshold, most depleted first.
    pub fn low_stock(&self) -> Vec<Record> {
        let open = self.open_set();
        alert::low_stock(open.values().map(|s| &s.record), &self.config.thresholds)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Ledger entries fulfilled between `start` and `end` inclusive.
    pub async fn history(&self, start: Date, end: Date) -> Result<LedgerRange, EngineError> {
        Ok(self.ledger.query_range(start, end).await?)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn open_set(&self) -> MutexGuard<'_, IndexMap<RecordKey, OpenSlot>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_lock(&self, key: &RecordKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drop the map's lock for `key` once nobody else holds a handle to it.
    fn release_key_lock(&self, key: &RecordKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // one handle in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restock_storage::MemoryLedger;
    use rust_decimal::Decimal;
    use time::macros::{date, datetime};

    fn key(location: &str) -> RecordKey {
        RecordKey::new(location, "Snacks", date!(2019 - 01 - 05))
    }

    fn record(location: &str, forecast: i64, on_hand: i64) -> Record {
        Record::open(
            key(location),
            Decimal::from(forecast),
            on_hand,
            &QuantityBounds::default(),
        )
        .unwrap()
    }

    fn engine() -> Arc<LifecycleEngine<MemoryLedger>> {
        Arc::new(LifecycleEngine::new(
            Arc::new(MemoryLedger::new()),
            EngineConfig::default(),
        ))
    }

    #[tokio::test]
    async fn update_on_hand_recomputes_gap() {
        let engine = engine();
        engine.seed(vec![record("Austin", 150, 0)]).await.unwrap();

        let updated = engine.update_on_hand(&key("Austin"), 40).unwrap();
        assert_eq!(updated.gap(), Decimal::from(110));
        assert_eq!(engine.get(&key("Austin")).unwrap().record, updated);
    }

    #[tokio::test]
    async fn rejected_on_hand_keeps_prior_value() {
        let engine = engine();
        engine.seed(vec![record("Austin", 150, 40)]).await.unwrap();

        for bad in [-1, 10_001] {
            let err = engine.update_on_hand(&key("Austin"), bad).unwrap_err();
            assert!(matches!(err, EngineError::InvalidQuantity(_)));
        }
        let slot = engine.get(&key("Austin")).unwrap();
        assert_eq!(slot.record.on_hand_quantity(), 40);
        assert_eq!(slot.record.gap(), Decimal::from(110));

        engine.update_on_hand(&key("Austin"), 10_000).unwrap();
    }

    #[tokio::test]
    async fn edits_to_unknown_keys_are_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.update_on_hand(&key("Nowhere"), 1),
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            engine.set_status(&key("Nowhere"), Status::Fulfilled),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn staging_is_reversible() {
        let engine = engine();
        engine.seed(vec![record("Austin", 10, 0)]).await.unwrap();

        engine.set_status(&key("Austin"), Status::Fulfilled).unwrap();
        assert_eq!(engine.staged_keys(), vec![key("Austin")]);
        assert!(engine.get(&key("Austin")).unwrap().record.is_open());

        engine.set_status(&key("Austin"), Status::Open).unwrap();
        assert!(engine.staged_keys().is_empty());
    }

    #[tokio::test]
    async fn commit_moves_staged_and_reports_unstaged() {
        let engine = engine();
        engine
            .seed(vec![record("Austin", 10, 2), record("Boston", 20, 5)])
            .await
            .unwrap();
        engine.set_status(&key("Austin"), Status::Fulfilled).unwrap();

        let now = datetime!(2025-03-01 10:00 UTC);
        let report = engine
            .commit_batch(vec![key("Austin"), key("Boston"), key("Chicago")], now)
            .await;

        assert_eq!(report.moved, vec![key("Austin")]);
        assert!(matches!(report.failed[0], (_, EngineError::NotStaged { .. })));
        assert!(matches!(report.failed[1], (_, EngineError::NotFound { .. })));
        assert!(engine.get(&key("Austin")).is_none());
        assert!(engine.get(&key("Boston")).is_some());

        let entries = engine
            .history(date!(2025 - 03 - 01), date!(2025 - 03 - 01))
            .await
            .unwrap()
            .to_vec();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fulfilled_at, now);
        assert_eq!(entries[0].gap, Decimal::from(8));
    }

    #[tokio::test]
    async fn open_set_keeps_insertion_order() {
        let engine = engine();
        engine
            .seed(vec![
                record("Chicago", 1, 0),
                record("Austin", 1, 0),
                record("Boston", 1, 0),
            ])
            .await
            .unwrap();
        engine.set_status(&key("Austin"), Status::Fulfilled).unwrap();
        engine
            .commit_batch(vec![key("Austin")], datetime!(2025-03-01 10:00 UTC))
            .await;

        let order: Vec<String> = engine
            .records()
            .iter()
            .map(|r| r.key().location.clone())
            .collect();
        assert_eq!(order, vec!["Chicago", "Boston"]);
    }

    #[tokio::test]
    async fn alerts_reflect_current_quantities() {
        let engine = engine();
        engine
            .seed(vec![record("Austin", 150, 0), record("Boston", 30, 25)])
            .await
            .unwrap();
        engine.update_on_hand(&key("Austin"), 40).unwrap();

        assert_eq!(
            engine.alerts(&key("Austin")).unwrap(),
            BTreeSet::from([AlertKind::HighGap])
        );
        assert!(engine.alerts(&key("Boston")).unwrap().is_empty());
        assert_eq!(
            engine.alert_summary(),
            AlertSummary {
                low_stock: 0,
                high_gap: 1
            }
        );
    }

    #[tokio::test]
    async fn key_locks_are_released() {
        let engine = engine();
        engine.seed(vec![record("Austin", 1, 0)]).await.unwrap();
        engine.set_status(&key("Austin"), Status::Fulfilled).unwrap();
        engine
            .commit_batch(vec![key("Austin")], datetime!(2025-03-01 10:00 UTC))
            .await;
        assert!(engine.key_locks.lock().unwrap().is_empty());
    }
}

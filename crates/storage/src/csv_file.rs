//! CSV-file ledger backend.
//!
//! One row per entry, columns as in [`LEDGER_COLUMNS`]. The whole file is
//! indexed in memory at open; appends go to the end of the file and are
//! `fsync`ed before they are published to readers.
//!
//! A `CsvLedger` holds an exclusive advisory lock on `<file>.lock` for as
//! long as it lives, so only one session appends to a history file at a
//! time. [`CsvLedger::read`] loads the file for queries without locking or
//! modifying it.
//!
//! Each append runs on the blocking pool. If the caller's timeout fires
//! first, the append is marked abandoned: a write that lands afterwards is
//! truncated away instead of published, so a timed-out append never shows
//! up in the ledger, now or after a restart.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use fs2::FileExt;
use restock_core::RecordKey;
use time::Date;
use tracing::{debug, info, warn};

use crate::entry::{LedgerEntry, LedgerRow, LEDGER_COLUMNS};
use crate::error::StorageError;
use crate::index::{LedgerIndex, LedgerRange};
use crate::memory::MemoryLedger;
use crate::traits::HistoryLedger;

/// Durable ledger stored as a CSV file.
#[derive(Debug)]
pub struct CsvLedger {
    path: PathBuf,
    writer: Arc<Mutex<Appender>>,
    index: Arc<RwLock<Arc<LedgerIndex>>>,
    /// Held locked until drop.
    _lock: File,
}

#[derive(Debug)]
struct Appender {
    file: File,
    needs_header: bool,
}

/// Hand-off between an append call and its blocking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppendState {
    Pending,
    Published,
    Abandoned,
}

/// Summary of what `open` found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenReport {
    pub entries: usize,
    /// Rows whose key repeated an earlier row; the first row wins.
    pub duplicates_dropped: usize,
    /// An incomplete final row (an unacknowledged write) was cut off.
    pub torn_tail_truncated: bool,
    /// An incomplete final row was ignored by a read-only load.
    pub torn_tail_skipped: bool,
    /// The file used legacy column names and was rewritten.
    pub migrated: bool,
}

/// What `load` may do to the file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    /// Truncate a torn tail and rewrite legacy or duplicated content.
    Repair,
    /// Never write.
    ReadOnly,
}

impl CsvLedger {
    /// Open (or create) the ledger at `path` for appending.
    ///
    /// Fails with `Backend` if another `CsvLedger` holds the file. Opening
    /// may repair the file: a torn final row is cut off, and legacy headers
    /// or duplicate rows cause a canonical rewrite.
    pub async fn open(path: impl Into<PathBuf>) -> Result<(CsvLedger, OpenReport), StorageError> {
        let path = path.into();
        tokio::task::spawn_blocking(move || CsvLedger::open_blocking(path))
            .await
            .map_err(|e| StorageError::Backend(format!("open task failed: {}", e)))?
    }

    /// Synchronous variant of [`CsvLedger::open`].
    pub fn open_blocking(path: PathBuf) -> Result<(CsvLedger, OpenReport), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock = acquire_lock(&path)?;

        let existed = path.exists();
        let (index, report) = if existed {
            load(&path, LoadMode::Repair)?
        } else {
            (LedgerIndex::new(), OpenReport::default())
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if !existed {
            sync_parent_dir(&path);
        }
        let needs_header = file.metadata()?.len() == 0;

        info!(
            path = %path.display(),
            entries = report.entries,
            duplicates_dropped = report.duplicates_dropped,
            migrated = report.migrated,
            "ledger opened"
        );

        Ok((
            CsvLedger {
                path,
                writer: Arc::new(Mutex::new(Appender { file, needs_header })),
                index: Arc::new(RwLock::new(Arc::new(index))),
                _lock: lock,
            },
            report,
        ))
    }

    /// Load the ledger at `path` into memory for queries.
    ///
    /// Takes no lock and never writes: a torn final row is skipped and a
    /// legacy file is read through its aliases. A missing file is an empty
    /// ledger.
    pub async fn read(path: impl Into<PathBuf>) -> Result<(MemoryLedger, OpenReport), StorageError> {
        let path = path.into();
        tokio::task::spawn_blocking(move || -> Result<(MemoryLedger, OpenReport), StorageError> {
            if !path.exists() {
                return Ok((MemoryLedger::new(), OpenReport::default()));
            }
            let (index, report) = load(&path, LoadMode::ReadOnly)?;
            debug!(path = %path.display(), entries = report.entries, "ledger read");
            Ok((MemoryLedger::from_index(index), report))
        })
        .await
        .map_err(|e| StorageError::Backend(format!("read task failed: {}", e)))?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> Result<Arc<LedgerIndex>, StorageError> {
        self.index
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| poisoned())
    }
}

#[async_trait]
impl HistoryLedger for CsvLedger {
    async fn append(&self, entry: LedgerEntry, timeout: Duration) -> Result<(), StorageError> {
        let key = entry.key.to_string();
        let state = Arc::new(Mutex::new(AppendState::Pending));

        let task = {
            let writer = Arc::clone(&self.writer);
            let index = Arc::clone(&self.index);
            let state = Arc::clone(&state);
            tokio::task::spawn_blocking(move || write_entry(&writer, &index, &state, entry))
        };

        match tokio::time::timeout(timeout, task).await {
            Ok(joined) => {
                joined.map_err(|e| StorageError::Backend(format!("append task failed: {}", e)))?
            }
            Err(_elapsed) => {
                let mut s = state.lock().map_err(|_| poisoned())?;
                if *s == AppendState::Published {
                    return Ok(());
                }
                *s = AppendState::Abandoned;
                let after_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(%key, after_ms, "ledger append timed out");
                Err(StorageError::Timeout { key, after_ms })
            }
        }
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

// ── Blocking helpers ─────────────────────────────────────────────────────────

fn poisoned() -> StorageError {
    StorageError::Backend("csv ledger lock poisoned".to_string())
}

fn csv_err(e: csv::Error) -> StorageError {
    StorageError::Backend(format!("csv: {}", e))
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Take the single-writer lock for `path`, without waiting.
fn acquire_lock(path: &Path) -> Result<File, StorageError> {
    let lock_path = lock_path(path);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    file.try_lock_exclusive().map_err(|e| {
        StorageError::Backend(format!(
            "history file '{}' is in use by another session: {}",
            path.display(),
            e
        ))
    })?;
    Ok(file)
}

/// Lock order: writer, then state, then index.
fn write_entry(
    writer: &Mutex<Appender>,
    index: &RwLock<Arc<LedgerIndex>>,
    state: &Mutex<AppendState>,
    entry: LedgerEntry,
) -> Result<(), StorageError> {
    let mut w = writer.lock().map_err(|_| poisoned())?;

    if *state.lock().map_err(|_| poisoned())? == AppendState::Abandoned {
        return Err(StorageError::Backend(
            "append abandoned before write".to_string(),
        ));
    }
    if index.read().map_err(|_| poisoned())?.contains(&entry.key) {
        return Err(StorageError::DuplicateKey {
            key: entry.key.to_string(),
        });
    }

    let bytes = encode_rows(std::slice::from_ref(&entry), w.needs_header)?;
    let len_before = w.file.metadata()?.len();
    if let Err(e) = w.file.write_all(&bytes).and_then(|_| w.file.sync_data()) {
        let _ = w.file.set_len(len_before);
        return Err(e.into());
    }

    let mut s = state.lock().map_err(|_| poisoned())?;
    if *s == AppendState::Abandoned {
        w.file.set_len(len_before)?;
        w.file.sync_data()?;
        debug!(key = %entry.key, "abandoned append rolled back");
        return Err(StorageError::Backend(
            "append abandoned after write; rolled back".to_string(),
        ));
    }
    *s = AppendState::Published;
    Arc::make_mut(&mut *index.write().map_err(|_| poisoned())?).insert(entry)?;
    w.needs_header = false;
    Ok(())
}

fn encode_rows(entries: &[LedgerEntry], with_header: bool) -> Result<Vec<u8>, StorageError> {
    let mut out = csv::WriterBuilder::new()
        .has_headers(with_header)
        .from_writer(Vec::new());
    for entry in entries {
        out.serialize(LedgerRow::encode(entry)?).map_err(csv_err)?;
    }
    out.into_inner()
        .map_err(|e| StorageError::Backend(format!("csv flush: {}", e)))
}

/// Read an existing history file into an index.
fn load(path: &Path, mode: LoadMode) -> Result<(LedgerIndex, OpenReport), StorageError> {
    let mut index = LedgerIndex::new();
    let mut report = OpenReport::default();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    if headers.is_empty() {
        return Ok((index, report));
    }
    let canonical = headers.iter().eq(LEDGER_COLUMNS.iter().copied());

    // Raw bytes, so a row torn inside a multi-byte character is still
    // reached by the torn-tail handling below.
    let records: Vec<csv::ByteRecord> = reader
        .byte_records()
        .collect::<Result<_, _>>()
        .map_err(csv_err)?;
    let last = records.len().saturating_sub(1);

    for (i, record) in records.iter().enumerate() {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let entry = match decode_record(record, &headers, line) {
            Ok(entry) => entry,
            Err(e) if i == last && canonical => {
                match mode {
                    LoadMode::Repair => {
                        let offset = record.position().map(|p| p.byte()).unwrap_or(0);
                        warn!(line, error = %e, "truncating incomplete final ledger row");
                        let file = OpenOptions::new().write(true).open(path)?;
                        file.set_len(offset)?;
                        file.sync_all()?;
                        report.torn_tail_truncated = true;
                    }
                    LoadMode::ReadOnly => {
                        warn!(line, error = %e, "ignoring incomplete final ledger row");
                        report.torn_tail_skipped = true;
                    }
                }
                break;
            }
            Err(e) => return Err(e),
        };

        match index.insert(entry) {
            Ok(()) => report.entries += 1,
            Err(StorageError::DuplicateKey { key }) => {
                warn!(%key, line, "duplicate ledger row dropped");
                report.duplicates_dropped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if mode == LoadMode::Repair && (!canonical || report.duplicates_dropped > 0) {
        rewrite(path, &index)?;
        report.migrated = !canonical;
    }
    Ok((index, report))
}

fn decode_record(
    record: &csv::ByteRecord,
    headers: &csv::StringRecord,
    line: u64,
) -> Result<LedgerEntry, StorageError> {
    let corrupt = |reason: String| StorageError::Corrupt { line, reason };
    if record.len() != headers.len() {
        return Err(corrupt(format!(
            "expected {} fields, found {}",
            headers.len(),
            record.len()
        )));
    }
    let record =
        csv::StringRecord::from_byte_record(record.clone()).map_err(|e| corrupt(e.to_string()))?;
    record
        .deserialize::<LedgerRow>(Some(headers))
        .map_err(|e| corrupt(e.to_string()))?
        .decode(line)
}

/// Replace the file with the canonical encoding of `index`.
fn rewrite(path: &Path, index: &LedgerIndex) -> Result<(), StorageError> {
    let entries: Vec<LedgerEntry> = match index.bounds() {
        Some((first, last)) => LedgerRange::new(Arc::new(index.clone()), first, last).to_vec(),
        None => Vec::new(),
    };
    let bytes = encode_rows(&entries, true)?;
    let tmp = path.with_extension("csv.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    sync_parent_dir(path);
    info!(path = %path.display(), entries = entries.len(), "ledger rewritten in canonical form");
    Ok(())
}

fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(d) = File::open(dir) {
            let _ = d.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use time::macros::{date, datetime};

    fn entry(location: &str) -> LedgerEntry {
        LedgerEntry {
            key: RecordKey::new(location, "Snacks", date!(2019 - 01 - 05)),
            forecasted_quantity: Decimal::from(150),
            on_hand_quantity: 40,
            gap: Decimal::from(110),
            fulfilled_at: datetime!(2025-03-01 10:00 UTC),
        }
    }

    #[test]
    fn encoded_header_matches_columns() {
        let bytes = encode_rows(&[entry("Austin")], true).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, LEDGER_COLUMNS.join(","));
        assert_eq!(
            text.lines().nth(1).unwrap(),
            "Austin,Snacks,2019-01-05,150,40,110,2025-03-01T10:00:00Z"
        );
    }

    #[test]
    fn write_entry_skips_abandoned_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let (ledger, _) = CsvLedger::open_blocking(path.clone()).unwrap();
        let state = Mutex::new(AppendState::Abandoned);
        let result = write_entry(&ledger.writer, &ledger.index, &state, entry("Austin"));
        assert!(result.is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert!(ledger.snapshot().unwrap().is_empty());
    }
}

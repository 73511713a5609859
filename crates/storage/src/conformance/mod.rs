//! Conformance test suite for `HistoryLedger` implementations.
//!
//! A backend-agnostic suite any ledger can run to check the guarantees the
//! lifecycle engine relies on:
//!
//! - **Append**: appended entries are visible through `contains`, `len`,
//!   `bounds` and `query_range`
//! - **Range queries**: inclusive date bounds, ordering, snapshot stability
//! - **Errors**: duplicate keys are refused without side effects
//! - **Concurrency**: racing appends of one key produce exactly one entry
//!
//! # Usage
//!
//! ```ignore
//! use restock_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { MemoryLedger::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod append;
mod concurrent;
mod error;
mod range;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use restock_core::RecordKey;
use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};

use crate::{HistoryLedger, LedgerEntry};

/// Timeout passed to every append in the suite.
const APPEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "append", "range").
    pub category: String,
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a ledger backend.
///
/// `factory` is called once per test and must return a fresh, empty ledger.
pub async fn run_conformance_suite<L, F, Fut>(factory: F) -> ConformanceReport
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let mut results = Vec::new();

    results.extend(append::run_append_tests(&factory).await);
    results.extend(range::run_range_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_entry(location: &str, period: Date, fulfilled_at: OffsetDateTime) -> LedgerEntry {
    LedgerEntry {
        key: RecordKey::new(location, "Health and beauty", period),
        forecasted_quantity: Decimal::from(30),
        on_hand_quantity: 12,
        gap: Decimal::from(18),
        fulfilled_at,
    }
}

async fn append_all<L: HistoryLedger>(ledger: &L, entries: Vec<LedgerEntry>) -> Result<(), String> {
    for entry in entries {
        let key = entry.key.to_string();
        ledger
            .append(entry, APPEND_TIMEOUT)
            .await
            .map_err(|e| format!("append {key}: {e}"))?;
    }
    Ok(())
}

use std::future::Future;
use std::sync::Arc;

use time::macros::{date, datetime};

use super::{make_entry, TestResult, APPEND_TIMEOUT};
use crate::{HistoryLedger, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<L, F, Fut>(factory: &F) -> Vec<TestResult>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_append_same_key_exactly_one_wins",
            concurrent_append_same_key_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_append_distinct_keys_all_succeed",
            concurrent_append_distinct_keys_all_succeed(factory).await,
        ),
    ]
}

/// N tasks append the same key at once. One must succeed; the rest must see
/// `DuplicateKey`; the ledger ends with a single entry.
async fn concurrent_append_same_key_exactly_one_wins<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let l = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let entry = make_entry("Yangon", date!(2019 - 01 - 05), datetime!(2025-03-01 10:00 UTC));
            match l.append(entry, APPEND_TIMEOUT).await {
                Ok(()) => Ok(true),
                Err(StorageError::DuplicateKey { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    let len = ledger.len().await.map_err(|e| e.to_string())?;
    if len != 1 {
        return Err(format!("expected 1 entry, got {len}"));
    }
    Ok(())
}

async fn concurrent_append_distinct_keys_all_succeed<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let l = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let entry = make_entry(
                &format!("store-{i}"),
                date!(2019 - 01 - 05),
                datetime!(2025-03-01 10:00 UTC),
            );
            l.append(entry, APPEND_TIMEOUT).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("append: {e}"))?;
    }

    let len = ledger.len().await.map_err(|e| e.to_string())?;
    if len != N {
        return Err(format!("expected {N} entries, got {len}"));
    }
    Ok(())
}

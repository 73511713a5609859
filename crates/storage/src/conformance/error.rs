use std::future::Future;

use time::macros::{date, datetime};

use super::{append_all, make_entry, TestResult, APPEND_TIMEOUT};
use crate::{HistoryLedger, StorageError};

pub(super) async fn run_error_tests<L, F, Fut>(factory: &F) -> Vec<TestResult>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    vec![
        TestResult::from_result(
            "error",
            "duplicate_key_rejected",
            duplicate_key_rejected(factory).await,
        ),
        TestResult::from_result(
            "error",
            "duplicate_key_leaves_ledger_unchanged",
            duplicate_key_leaves_ledger_unchanged(factory).await,
        ),
    ]
}

async fn duplicate_key_rejected<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    let entry = make_entry("Yangon", date!(2019 - 01 - 05), datetime!(2025-03-01 10:00 UTC));
    append_all(&ledger, vec![entry.clone()]).await?;

    match ledger.append(entry.clone(), APPEND_TIMEOUT).await {
        Err(StorageError::DuplicateKey { key }) if key == entry.key.to_string() => Ok(()),
        other => Err(format!("expected DuplicateKey, got {other:?}")),
    }
}

/// The rejected entry differs in every non-key field; none of it may leak
/// into the ledger.
async fn duplicate_key_leaves_ledger_unchanged<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    let original = make_entry("Yangon", date!(2019 - 01 - 05), datetime!(2025-03-01 10:00 UTC));
    append_all(&ledger, vec![original.clone()]).await?;

    let mut second = original.clone();
    second.on_hand_quantity = 30;
    second.gap = second.forecasted_quantity - rust_decimal::Decimal::from(30);
    second.fulfilled_at = datetime!(2025-03-09 10:00 UTC);
    let _ = ledger.append(second, APPEND_TIMEOUT).await;

    let len = ledger.len().await.map_err(|e| e.to_string())?;
    if len != 1 {
        return Err(format!("expected 1 entry, got {len}"));
    }
    let all = ledger
        .query_range(date!(2025 - 03 - 01), date!(2025 - 03 - 31))
        .await
        .map_err(|e| e.to_string())?
        .to_vec();
    if all != vec![original] {
        return Err(format!("ledger content changed: {all:?}"));
    }
    Ok(())
}

use std::future::Future;

use time::macros::{date, datetime};

use super::{append_all, make_entry, TestResult};
use crate::HistoryLedger;

pub(super) async fn run_append_tests<L, F, Fut>(factory: &F) -> Vec<TestResult>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    vec![
        TestResult::from_result(
            "append",
            "empty_ledger_has_no_entries",
            empty_ledger_has_no_entries(factory).await,
        ),
        TestResult::from_result(
            "append",
            "append_makes_key_visible",
            append_makes_key_visible(factory).await,
        ),
        TestResult::from_result(
            "append",
            "appended_entry_round_trips_through_range",
            appended_entry_round_trips_through_range(factory).await,
        ),
        TestResult::from_result(
            "append",
            "bounds_follow_appends",
            bounds_follow_appends(factory).await,
        ),
    ]
}

async fn empty_ledger_has_no_entries<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    let len = ledger.len().await.map_err(|e| e.to_string())?;
    if len != 0 {
        return Err(format!("expected 0 entries, got {len}"));
    }
    let bounds = ledger.bounds().await.map_err(|e| e.to_string())?;
    if bounds.is_some() {
        return Err(format!("expected no bounds, got {bounds:?}"));
    }
    Ok(())
}

async fn append_makes_key_visible<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    let entry = make_entry("Mandalay", date!(2019 - 02 - 11), datetime!(2025-04-01 09:30 UTC));
    let key = entry.key.clone();

    if ledger.contains(&key).await.map_err(|e| e.to_string())? {
        return Err("key present before append".into());
    }
    append_all(&ledger, vec![entry]).await?;
    if !ledger.contains(&key).await.map_err(|e| e.to_string())? {
        return Err("key missing after append".into());
    }
    let len = ledger.len().await.map_err(|e| e.to_string())?;
    if len != 1 {
        return Err(format!("expected 1 entry, got {len}"));
    }
    Ok(())
}

async fn appended_entry_round_trips_through_range<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    let entry = make_entry("Naypyitaw", date!(2019 - 03 - 02), datetime!(2025-04-02 17:45 UTC));
    append_all(&ledger, vec![entry.clone()]).await?;

    let found = ledger
        .query_range(date!(2025 - 04 - 02), date!(2025 - 04 - 02))
        .await
        .map_err(|e| e.to_string())?
        .to_vec();
    if found != vec![entry] {
        return Err(format!("range returned {found:?}"));
    }
    Ok(())
}

async fn bounds_follow_appends<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    append_all(
        &ledger,
        vec![
            make_entry("Yangon", date!(2019 - 01 - 01), datetime!(2025-05-10 12:00 UTC)),
            make_entry("Mandalay", date!(2019 - 01 - 01), datetime!(2025-05-03 08:00 UTC)),
        ],
    )
    .await?;

    let bounds = ledger.bounds().await.map_err(|e| e.to_string())?;
    if bounds != Some((date!(2025 - 05 - 03), date!(2025 - 05 - 10))) {
        return Err(format!("unexpected bounds {bounds:?}"));
    }
    Ok(())
}

use std::future::Future;

use time::macros::{date, datetime};

use super::{append_all, make_entry, TestResult};
use crate::HistoryLedger;

pub(super) async fn run_range_tests<L, F, Fut>(factory: &F) -> Vec<TestResult>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    vec![
        TestResult::from_result(
            "range",
            "range_includes_both_end_days",
            range_includes_both_end_days(factory).await,
        ),
        TestResult::from_result(
            "range",
            "range_orders_by_fulfilment_time",
            range_orders_by_fulfilment_time(factory).await,
        ),
        TestResult::from_result(
            "range",
            "inverted_range_is_empty",
            inverted_range_is_empty(factory).await,
        ),
        TestResult::from_result(
            "range",
            "range_is_a_stable_snapshot",
            range_is_a_stable_snapshot(factory).await,
        ),
    ]
}

async fn range_includes_both_end_days<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    let period = date!(2019 - 01 - 20);
    append_all(
        &ledger,
        vec![
            make_entry("before", period, datetime!(2025-06-30 23:59:59 UTC)),
            make_entry("first", period, datetime!(2025-07-01 00:00 UTC)),
            make_entry("last", period, datetime!(2025-07-03 23:59:59 UTC)),
            make_entry("after", period, datetime!(2025-07-04 00:00 UTC)),
        ],
    )
    .await?;

    let range = ledger
        .query_range(date!(2025 - 07 - 01), date!(2025 - 07 - 03))
        .await
        .map_err(|e| e.to_string())?;
    let got: Vec<String> = range.iter().map(|e| e.key.location.clone()).collect();
    if got != ["first", "last"] {
        return Err(format!("expected [first, last], got {got:?}"));
    }
    Ok(())
}

async fn range_orders_by_fulfilment_time<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    let period = date!(2019 - 01 - 20);
    append_all(
        &ledger,
        vec![
            make_entry("late", period, datetime!(2025-07-01 18:00 UTC)),
            make_entry("early", period, datetime!(2025-07-01 06:00 UTC)),
            make_entry("middle", period, datetime!(2025-07-01 12:00 UTC)),
        ],
    )
    .await?;

    let range = ledger
        .query_range(date!(2025 - 07 - 01), date!(2025 - 07 - 01))
        .await
        .map_err(|e| e.to_string())?;
    let got: Vec<String> = range.iter().map(|e| e.key.location.clone()).collect();
    if got != ["early", "middle", "late"] {
        return Err(format!("unexpected order {got:?}"));
    }
    Ok(())
}

async fn inverted_range_is_empty<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    append_all(
        &ledger,
        vec![make_entry(
            "Yangon",
            date!(2019 - 01 - 20),
            datetime!(2025-07-02 10:00 UTC),
        )],
    )
    .await?;

    let count = ledger
        .query_range(date!(2025 - 07 - 03), date!(2025 - 07 - 01))
        .await
        .map_err(|e| e.to_string())?
        .count();
    if count != 0 {
        return Err(format!("expected empty range, got {count} entries"));
    }
    Ok(())
}

/// A range obtained before an append does not see it, and can be iterated
/// more than once with the same result.
async fn range_is_a_stable_snapshot<L, F, Fut>(factory: &F) -> Result<(), String>
where
    L: HistoryLedger,
    F: Fn() -> Fut,
    Fut: Future<Output = L>,
{
    let ledger = factory().await;
    let period = date!(2019 - 01 - 20);
    append_all(
        &ledger,
        vec![make_entry("one", period, datetime!(2025-07-01 10:00 UTC))],
    )
    .await?;

    let range = ledger
        .query_range(date!(2025 - 07 - 01), date!(2025 - 07 - 31))
        .await
        .map_err(|e| e.to_string())?;

    append_all(
        &ledger,
        vec![make_entry("two", period, datetime!(2025-07-02 10:00 UTC))],
    )
    .await?;

    let first_pass = range.count();
    let second_pass = range.count();
    if first_pass != 1 || second_pass != 1 {
        return Err(format!(
            "snapshot changed: first pass {first_pass}, second pass {second_pass}"
        ));
    }
    Ok(())
}

//! Threshold alerts.
//!
//! Alerts are a view over records, recomputed on demand and never stored.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Kinds of alert a record can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertKind {
    /// On-hand quantity is below `Thresholds::low_stock`.
    LowStock,
    /// Gap is above `Thresholds::high_gap`.
    HighGap,
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::LowStock => "low stock",
            AlertKind::HighGap => "high gap",
        }
    }
}

/// Alert thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub low_stock: i64,
    pub high_gap: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            low_stock: 20,
            high_gap: 100,
        }
    }
}

/// Evaluate one record. Returns an empty set when nothing fires.
pub fn evaluate(record: &Record, thresholds: &Thresholds) -> BTreeSet<AlertKind> {
    let mut alerts = BTreeSet::new();
    if i64::from(record.on_hand_quantity()) < thresholds.low_stock {
        alerts.insert(AlertKind::LowStock);
    }
    if record.gap() > Decimal::from(thresholds.high_gap) {
        alerts.insert(AlertKind::HighGap);
    }
    alerts
}

/// Count of records raising each alert kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertSummary {
    pub low_stock: usize,
    pub high_gap: usize,
}

pub fn summarize<'a, I>(records: I, thresholds: &Thresholds) -> AlertSummary
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut summary = AlertSummary::default();
    for record in records {
        let alerts = evaluate(record, thresholds);
        if alerts.contains(&AlertKind::LowStock) {
            summary.low_stock += 1;
        }
        if alerts.contains(&AlertKind::HighGap) {
            summary.high_gap += 1;
        }
    }
    summary
}

/// Records raising `LowStock`, most depleted first.
///
/// The sort is stable, so records with equal stock keep their input order.
pub fn low_stock<'a, I>(records: I, thresholds: &Thresholds) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut out: Vec<&Record> = records
        .into_iter()
        .filter(|r| i64::from(r.on_hand_quantity()) < thresholds.low_stock)
        .collect();
    out.sort_by_key(|r| r.on_hand_quantity());
    out
}

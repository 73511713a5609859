//! Raw dataset ingestion.
//!
//! Reads a store sales export (CSV), asks a [`ForecastProvider`] for the
//! forecasted quantity of every open row, and seeds the resulting records
//! into the engine. Bad rows are rejected individually; they never abort the
//! batch.

use std::io;

use restock_core::{parse_period, Record, RecordKey, Status};
use restock_storage::HistoryLedger;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::forecast::{ForecastError, ForecastProvider};
use crate::lifecycle::LifecycleEngine;

/// One parsed dataset row, before a forecast is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRow {
    /// 1-based line in the source file (the header is line 1).
    pub line: u64,
    pub key: RecordKey,
    pub on_hand: i64,
    pub status: Status,
    /// The dataset's own `Predicted Quantity`, when present.
    pub predicted: Option<Decimal>,
}

/// A row that was not ingested, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Data rows read, including rejected ones.
    pub rows: usize,
    pub seeded: Vec<RecordKey>,
    /// Skipped: already fulfilled in the ledger.
    pub in_ledger: Vec<RecordKey>,
    /// Skipped: already in the open set (or repeated in the dataset).
    pub duplicates: Vec<RecordKey>,
    /// Skipped: marked completed in the dataset itself.
    pub already_completed: Vec<RecordKey>,
    pub rejected: Vec<RowRejection>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("cannot read dataset: {0}")]
    Read(#[from] csv::Error),
    #[error("dataset has no '{0}' column")]
    MissingColumn(&'static str),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Column names as written by the store export, with the canonical
/// lower-case names accepted as well.
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "City", alias = "location")]
    city: String,
    #[serde(rename = "Product line", alias = "product")]
    product_line: String,
    #[serde(rename = "Date", alias = "period")]
    date: String,
    #[serde(rename = "Current Stock", alias = "on_hand_quantity", default)]
    current_stock: Option<String>,
    #[serde(rename = "Status", alias = "status", default)]
    status: Option<String>,
    #[serde(
        rename = "Predicted Quantity",
        alias = "forecasted_quantity",
        default
    )]
    predicted: Option<String>,
}

const REQUIRED_COLUMNS: [(&str, &str); 3] = [
    ("City", "location"),
    ("Product line", "product"),
    ("Date", "period"),
];

/// Parse a dataset. Returns the usable rows and the rejected ones.
pub fn read_dataset<R: io::Read>(
    input: R,
) -> Result<(Vec<DatasetRow>, Vec<RowRejection>), IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);
    let headers = reader.headers()?.clone();
    for (name, alias) in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == name || h == alias) {
            return Err(IngestError::MissingColumn(name));
        }
    }

    let mut rows = Vec::new();
    let mut rejected = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let parsed = record
            .deserialize::<RawRow>(Some(&headers))
            .map_err(|e| e.to_string())
            .and_then(|raw| parse_row(raw, line));
        match parsed {
            Ok(row) => rows.push(row),
            Err(reason) => rejected.push(RowRejection { line, reason }),
        }
    }
    Ok((rows, rejected))
}

fn parse_row(raw: RawRow, line: u64) -> Result<DatasetRow, String> {
    if raw.city.is_empty() || raw.product_line.is_empty() {
        return Err("location and product line are required".to_string());
    }
    let period = parse_period(&raw.date).map_err(|e| format!("invalid date {e}"))?;
    let on_hand = match raw.current_stock.as_deref() {
        None | Some("") => 0,
        Some(s) => parse_stock(s).ok_or_else(|| format!("invalid current stock '{s}'"))?,
    };
    let status = match raw.status.as_deref() {
        None => Status::Open,
        Some(s) => Status::parse_label(s).ok_or_else(|| format!("unknown status '{s}'"))?,
    };
    let predicted = match raw.predicted.as_deref() {
        None | Some("") => None,
        Some(s) => Some(
            s.parse::<Decimal>()
                .or_else(|_| Decimal::from_scientific(s))
                .map_err(|_| format!("invalid predicted quantity '{s}'"))?,
        ),
    };
    Ok(DatasetRow {
        line,
        key: RecordKey::new(raw.city, raw.product_line, period),
        on_hand,
        status,
        predicted,
    })
}

/// Whole numbers only; `12.0` is accepted, `12.5` is not.
fn parse_stock(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().or_else(|| {
        let d = s.parse::<Decimal>().ok()?;
        if d.fract().is_zero() {
            d.to_i64()
        } else {
            None
        }
    })
}

/// Read `input`, forecast it with `provider`, and seed the open records.
pub async fn ingest<L, R, P>(
    engine: &LifecycleEngine<L>,
    input: R,
    provider: &P,
) -> Result<IngestReport, IngestError>
where
    L: HistoryLedger,
    R: io::Read,
    P: ForecastProvider + ?Sized,
{
    let (rows, mut rejected) = read_dataset(input)?;
    let mut report = IngestReport {
        rows: rows.len() + rejected.len(),
        ..IngestReport::default()
    };

    let (open_rows, completed): (Vec<DatasetRow>, Vec<DatasetRow>) =
        rows.into_iter().partition(|r| r.status == Status::Open);
    report.already_completed = completed.into_iter().map(|r| r.key).collect();

    let forecasts = provider.forecast(&open_rows).await?;

    let mut records = Vec::with_capacity(open_rows.len());
    for row in open_rows {
        let Some(forecast) = forecasts.get(&row.key).copied() else {
            rejected.push(RowRejection {
                line: row.line,
                reason: format!("no forecast for {}", row.key),
            });
            continue;
        };
        match Record::open(row.key, forecast, row.on_hand, &engine.config().bounds) {
            Ok(record) => records.push(record),
            Err(e) => rejected.push(RowRejection {
                line: row.line,
                reason: e.to_string(),
            }),
        }
    }

    let seeded = engine.seed(records).await?;
    report.seeded = seeded.seeded;
    report.in_ledger = seeded.in_ledger;
    report.duplicates = seeded.duplicates;

    rejected.sort_by_key(|r| r.line);
    for r in &rejected {
        warn!(line = r.line, reason = %r.reason, "dataset row rejected");
    }
    report.rejected = rejected;

    info!(
        rows = report.rows,
        seeded = report.seeded.len(),
        completed = report.already_completed.len(),
        rejected = report.rejected.len(),
        "dataset ingested"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn reads_store_export_columns() {
        let csv = "Invoice ID,City,Product line,Date,Unit price,Current Stock,Status,Predicted Quantity\n\
                   750-67-8428,Yangon,Health and beauty,01-05-2019,74.69,12,Pending,7.4\n\
                   226-31-3081,Naypyitaw,Electronic accessories,2019-03-08,15.28,,,5\n";
        let (rows, rejected) = read_dataset(csv.as_bytes()).unwrap();
        assert!(rejected.is_empty(), "{rejected:?}");
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].key.period, date!(2019 - 05 - 01));
        assert_eq!(rows[0].on_hand, 12);
        assert_eq!(rows[0].predicted, Some("7.4".parse().unwrap()));
        assert_eq!(rows[0].line, 2);

        assert_eq!(rows[1].on_hand, 0);
        assert_eq!(rows[1].status, Status::Open);
        assert_eq!(rows[1].line, 3);
    }

    #[test]
    fn bad_rows_are_rejected_individually() {
        let csv = "City,Product line,Date,Current Stock,Status\n\
                   Yangon,Food,31-02-2019,1,Pending\n\
                   Yangon,Food,2019-01-01,2.5,Pending\n\
                   Yangon,Food,2019-01-01,3,Shipped\n\
                   Yangon,Food,2019-01-02,4.0,Completed\n";
        let (rows, rejected) = read_dataset(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].on_hand, 4);
        assert_eq!(rows[0].status, Status::Fulfilled);
        let lines: Vec<u64> = rejected.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 4]);
    }

    #[test]
    fn missing_required_column_fails() {
        let csv = "City,Date\nYangon,2019-01-01\n";
        assert!(matches!(
            read_dataset(csv.as_bytes()),
            Err(IngestError::MissingColumn("Product line"))
        ));
    }
}

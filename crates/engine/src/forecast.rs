//! Forecast provider trait and implementations.
//!
//! A `ForecastProvider` supplies the forecasted quantity for each record of
//! an ingestion batch. How the number is produced (a trained model, a
//! spreadsheet column, a fixed table) is opaque to the engine.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use async_trait::async_trait;
use restock_core::RecordKey;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::ingest::DatasetRow;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors that can occur when a provider produces forecasts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForecastError {
    #[error("forecast provider error: {0}")]
    Provider(String),
}

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Asynchronous source of forecasted quantities.
///
/// Receives the whole batch so implementations can make one call per
/// ingestion. Keys missing from the returned map are reported as rejected
/// rows by the ingester.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn forecast(
        &self,
        rows: &[DatasetRow],
    ) -> Result<HashMap<RecordKey, Decimal>, ForecastError>;
}

// ──────────────────────────────────────────────
// ColumnForecast
// ──────────────────────────────────────────────

/// Takes each row's forecast from the dataset's own `Predicted Quantity`
/// column, as written by the upstream model export.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnForecast;

#[async_trait]
impl ForecastProvider for ColumnForecast {
    async fn forecast(
        &self,
        rows: &[DatasetRow],
    ) -> Result<HashMap<RecordKey, Decimal>, ForecastError> {
        Ok(rows
            .iter()
            .filter_map(|r| r.predicted.map(|p| (r.key.clone(), p)))
            .collect())
    }
}

// ──────────────────────────────────────────────
// StaticForecast
// ──────────────────────────────────────────────

/// A fixed `key -> forecast` table.
///
/// Useful for tests and for forecasts computed offline into a
/// `key,forecasted_quantity` CSV.
#[derive(Debug, Clone, Default)]
pub struct StaticForecast {
    forecasts: HashMap<RecordKey, Decimal>,
}

#[derive(Deserialize)]
struct ForecastRow {
    key: String,
    forecasted_quantity: String,
}

impl StaticForecast {
    pub fn new(forecasts: HashMap<RecordKey, Decimal>) -> Self {
        Self { forecasts }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a `key,forecasted_quantity` CSV. Keys use the
    /// `location|product|YYYY-MM-DD` form.
    pub fn from_reader<R: io::Read>(input: R) -> Result<Self, ForecastError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
        let mut forecasts = HashMap::new();
        for (i, row) in reader.deserialize::<ForecastRow>().enumerate() {
            let line = i + 2;
            let row = row.map_err(|e| ForecastError::Provider(format!("line {line}: {e}")))?;
            let key: RecordKey = row
                .key
                .parse()
                .map_err(|e| ForecastError::Provider(format!("line {line}: {e}")))?;
            let quantity: Decimal = row.forecasted_quantity.parse().map_err(|e| {
                ForecastError::Provider(format!(
                    "line {line}: forecast '{}': {e}",
                    row.forecasted_quantity
                ))
            })?;
            forecasts.insert(key, quantity);
        }
        Ok(Self { forecasts })
    }

    pub fn from_path(path: &Path) -> Result<Self, ForecastError> {
        let file = std::fs::File::open(path)
            .map_err(|e| ForecastError::Provider(format!("{}: {e}", path.display())))?;
        Self::from_reader(file)
    }

    pub fn len(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }
}

#[async_trait]
impl ForecastProvider for StaticForecast {
    async fn forecast(
        &self,
        rows: &[DatasetRow],
    ) -> Result<HashMap<RecordKey, Decimal>, ForecastError> {
        Ok(rows
            .iter()
            .filter_map(|r| self.forecasts.get(&r.key).map(|f| (r.key.clone(), *f)))
            .collect())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use restock_core::Status;
    use time::macros::date;

    fn row(location: &str, predicted: Option<i64>) -> DatasetRow {
        DatasetRow {
            line: 2,
            key: RecordKey::new(location, "Snacks", date!(2019 - 01 - 05)),
            on_hand: 0,
            status: Status::Open,
            predicted: predicted.map(Decimal::from),
        }
    }

    #[tokio::test]
    async fn column_forecast_uses_predicted_column() {
        let rows = vec![row("Austin", Some(150)), row("Boston", None)];
        let result = ColumnForecast.forecast(&rows).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[&rows[0].key], Decimal::from(150));
    }

    #[tokio::test]
    async fn static_forecast_loads_csv() {
        let csv = "key,forecasted_quantity\n\
                   Austin|Snacks|2019-01-05,12.75\n\
                   Boston|Snacks|05-01-2019, 3\n";
        let provider = StaticForecast::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(provider.len(), 2);

        let rows = vec![row("Austin", None), row("Boston", Some(99)), row("Chicago", None)];
        let result = provider.forecast(&rows).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[&rows[0].key], "12.75".parse::<Decimal>().unwrap());
        assert_eq!(result[&rows[1].key], Decimal::from(3));
    }

    #[test]
    fn static_forecast_reports_bad_line() {
        let csv = "key,forecasted_quantity\nAustin|Snacks|2019-01-05,lots\n";
        let err = StaticForecast::from_reader(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn error_display() {
        let err = ForecastError::Provider("model offline".to_string());
        assert_eq!(err.to_string(), "forecast provider error: model offline");
    }
}

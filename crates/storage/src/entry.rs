use restock_core::{parse_period, Record, RecordKey, Status};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::StorageError;

/// An immutable ledger entry: a record as it was at the moment it was
/// fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub key: RecordKey,
    pub forecasted_quantity: Decimal,
    pub on_hand_quantity: u32,
    pub gap: Decimal,
    /// Always normalized to UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub fulfilled_at: OffsetDateTime,
}

impl LedgerEntry {
    /// Rebuild the fulfilled [`Record`] this entry was written from.
    pub fn to_record(&self) -> Record {
        Record::restore_fulfilled(
            self.key.clone(),
            self.forecasted_quantity,
            self.on_hand_quantity,
            self.fulfilled_at,
        )
    }
}

/// Only fulfilled records can become ledger entries; an open record is
/// handed back unchanged.
impl TryFrom<Record> for LedgerEntry {
    type Error = Record;

    fn try_from(record: Record) -> Result<Self, Self::Error> {
        let fulfilled_at = match (record.status(), record.fulfilled_at()) {
            (Status::Fulfilled, Some(at)) => at,
            _ => return Err(record),
        };
        Ok(LedgerEntry {
            key: record.key().clone(),
            forecasted_quantity: record.forecasted_quantity(),
            on_hand_quantity: record.on_hand_quantity(),
            gap: record.gap(),
            fulfilled_at: fulfilled_at.to_offset(UtcOffset::UTC),
        })
    }
}

// ──────────────────────────────────────────────
// CSV row shape
// ──────────────────────────────────────────────

/// Column order of the persisted history file.
pub const LEDGER_COLUMNS: [&str; 7] = [
    "location",
    "product",
    "period",
    "forecasted_quantity",
    "on_hand_quantity",
    "gap",
    "fulfilled_at",
];

/// One row of the history file.
///
/// Aliases accept the column names of history files written by the older
/// spreadsheet dashboard, so those files can be opened and migrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LedgerRow {
    #[serde(alias = "City")]
    pub location: String,
    #[serde(alias = "Product line")]
    pub product: String,
    #[serde(alias = "Date")]
    pub period: String,
    #[serde(alias = "Needed Stock")]
    pub forecasted_quantity: String,
    #[serde(alias = "Current Stock")]
    pub on_hand_quantity: String,
    #[serde(alias = "Gap to Fulfill", default)]
    pub gap: String,
    #[serde(alias = "Completed At")]
    pub fulfilled_at: String,
}

impl LedgerRow {
    pub(crate) fn encode(entry: &LedgerEntry) -> Result<LedgerRow, StorageError> {
        let fulfilled_at = entry
            .fulfilled_at
            .format(&Rfc3339)
            .map_err(|e| StorageError::Backend(format!("format fulfilled_at: {}", e)))?;
        let period = entry
            .key
            .period
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|e| StorageError::Backend(format!("format period: {}", e)))?;
        Ok(LedgerRow {
            location: entry.key.location.clone(),
            product: entry.key.product.clone(),
            period,
            forecasted_quantity: entry.forecasted_quantity.to_string(),
            on_hand_quantity: entry.on_hand_quantity.to_string(),
            gap: entry.gap.to_string(),
            fulfilled_at,
        })
    }

    /// Decode a row. The persisted gap is ignored and recomputed.
    pub(crate) fn decode(self, line: u64) -> Result<LedgerEntry, StorageError> {
        let corrupt = |reason: String| StorageError::Corrupt { line, reason };

        let period = parse_period(&self.period).map_err(|e| corrupt(format!("period {}", e)))?;
        let forecasted_quantity = parse_decimal(&self.forecasted_quantity)
            .ok_or_else(|| corrupt(format!("forecast '{}'", self.forecasted_quantity)))?;
        let on_hand_quantity = parse_count(&self.on_hand_quantity)
            .ok_or_else(|| corrupt(format!("on-hand '{}'", self.on_hand_quantity)))?;
        let fulfilled_at = parse_timestamp(&self.fulfilled_at)
            .ok_or_else(|| corrupt(format!("fulfilled_at '{}'", self.fulfilled_at)))?;

        let record = Record::restore_fulfilled(
            RecordKey::new(self.location, self.product, period),
            forecasted_quantity,
            on_hand_quantity,
            fulfilled_at,
        );
        LedgerEntry::try_from(record)
            .map_err(|r| corrupt(format!("record {} is not fulfilled", r.key())))
    }
}

pub(crate) fn parse_decimal(s: &str) -> Option<Decimal> {
    let s = s.trim();
    s.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(s).ok())
}

fn parse_count(s: &str) -> Option<u32> {
    let s = s.trim();
    s.parse::<u32>().ok().or_else(|| {
        let d = parse_decimal(s)?;
        if d.fract().is_zero() {
            d.to_u32()
        } else {
            None
        }
    })
}

/// RFC 3339, or the naive `YYYY-MM-DD HH:MM:SS` form (taken as UTC).
pub(crate) fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(ts.to_offset(UtcOffset::UTC));
    }
    PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use restock_core::QuantityBounds;
    use time::macros::{date, datetime};

    fn fulfilled() -> Record {
        Record::open(
            RecordKey::new("Austin", "Snacks", date!(2019 - 01 - 05)),
            Decimal::from(150),
            40,
            &QuantityBounds::default(),
        )
        .unwrap()
        .into_fulfilled(datetime!(2025-03-01 12:00 +02:00))
        .unwrap()
    }

    #[test]
    fn entry_from_fulfilled_record_is_utc() {
        let entry = LedgerEntry::try_from(fulfilled()).unwrap();
        assert_eq!(entry.fulfilled_at, datetime!(2025-03-01 10:00 UTC));
        assert_eq!(entry.gap, Decimal::from(110));
    }

    #[test]
    fn open_record_is_not_an_entry() {
        let open = Record::open(
            RecordKey::new("Austin", "Snacks", date!(2019 - 01 - 05)),
            Decimal::from(1),
            0,
            &QuantityBounds::default(),
        )
        .unwrap();
        assert!(LedgerEntry::try_from(open).is_err());
    }

    #[test]
    fn row_decode_accepts_dashboard_timestamps() {
        let row = LedgerRow {
            location: "Yangon".into(),
            product: "Sports and travel".into(),
            period: "08-03-2019".into(),
            forecasted_quantity: "7.5".into(),
            on_hand_quantity: "2.0".into(),
            gap: "".into(),
            fulfilled_at: "2025-06-30 18:04:11".into(),
        };
        let entry = row.decode(2).unwrap();
        assert_eq!(entry.key.period, date!(2019 - 03 - 08));
        assert_eq!(entry.on_hand_quantity, 2);
        assert_eq!(entry.gap, "5.5".parse::<Decimal>().unwrap());
        assert_eq!(entry.fulfilled_at, datetime!(2025-06-30 18:04:11 UTC));
    }

    #[test]
    fn row_decode_reports_line() {
        let row = LedgerRow {
            location: "Yangon".into(),
            product: "Sports and travel".into(),
            period: "2019-03-08".into(),
            forecasted_quantity: "seven".into(),
            on_hand_quantity: "2".into(),
            gap: "".into(),
            fulfilled_at: "2025-06-30T18:04:11Z".into(),
        };
        assert!(matches!(
            row.decode(9),
            Err(StorageError::Corrupt { line: 9, .. })
        ));
    }
}

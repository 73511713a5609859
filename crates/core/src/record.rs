//! Demand records and their identity.
//!
//! A [`Record`] is one (location, product line, period) observation. Its
//! [`RecordKey`] is the identity used by the open set and the history ledger
//! to detect duplicates.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::gap::{self, QuantityBounds, QuantityError};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Separator used by the text form of a [`RecordKey`].
pub const KEY_SEPARATOR: char = '|';

// ──────────────────────────────────────────────
// Key
// ──────────────────────────────────────────────

/// Stable identity of a record: (location, product line, as-of period).
///
/// Orders by location, then product, then period. Renders as
/// `location|product|YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub location: String,
    pub product: String,
    #[serde(with = "iso_date")]
    pub period: Date,
}

impl RecordKey {
    pub fn new(location: impl Into<String>, product: impl Into<String>, period: Date) -> Self {
        RecordKey {
            location: location.into(),
            product: product.into(),
            period,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = self
            .period
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|_| fmt::Error)?;
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.location,
            self.product,
            period,
            sep = KEY_SEPARATOR
        )
    }
}

/// Error parsing the `location|product|YYYY-MM-DD` text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("record key '{0}' must have the form location|product|YYYY-MM-DD")]
    Shape(String),
    #[error("record key '{key}' has an invalid period: {reason}")]
    Period { key: String, reason: String },
}

impl FromStr for RecordKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(KEY_SEPARATOR).collect();
        let [location, product, period] = parts.as_slice() else {
            return Err(KeyParseError::Shape(s.to_string()));
        };
        if location.trim().is_empty() || product.trim().is_empty() {
            return Err(KeyParseError::Shape(s.to_string()));
        }
        let period = parse_period(period).map_err(|reason| KeyParseError::Period {
            key: s.to_string(),
            reason,
        })?;
        Ok(RecordKey::new(location.trim(), product.trim(), period))
    }
}

/// Parse a period date.
///
/// Accepts ISO `YYYY-MM-DD` and the `DD-MM-YYYY` form used by store
/// sales exports.
pub fn parse_period(s: &str) -> Result<Date, String> {
    let s = s.trim();
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .or_else(|_| Date::parse(s, format_description!("[day]-[month]-[year]")))
        .map_err(|e| format!("'{}': {}", s, e))
}

// ──────────────────────────────────────────────
// Status
// ──────────────────────────────────────────────

/// Lifecycle status. The only transition is `Open -> Fulfilled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Open,
    Fulfilled,
}

impl Status {
    /// Parse an operator-facing status label.
    ///
    /// `Pending` and `Completed` are the labels store spreadsheets use.
    pub fn parse_label(s: &str) -> Option<Status> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "open" | "pending" => Some(Status::Open),
            "fulfilled" | "completed" | "complete" | "done" => Some(Status::Fulfilled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "Open",
            Status::Fulfilled => "Fulfilled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Record
// ──────────────────────────────────────────────

/// One demand observation.
///
/// Fields are private so that `gap` can never go stale: every path that
/// changes `on_hand_quantity` goes through [`gap::recompute`]. Deserialization
/// recomputes the gap as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordRepr")]
pub struct Record {
    key: RecordKey,
    forecasted_quantity: Decimal,
    on_hand_quantity: u32,
    gap: Decimal,
    status: Status,
    #[serde(with = "time::serde::rfc3339::option", default)]
    fulfilled_at: Option<OffsetDateTime>,
}

impl Record {
    /// Create an open record.
    ///
    /// Fails if the forecast is negative or the on-hand quantity exceeds
    /// `bounds`.
    pub fn open(
        key: RecordKey,
        forecasted_quantity: Decimal,
        on_hand_quantity: i64,
        bounds: &QuantityBounds,
    ) -> Result<Record, QuantityError> {
        if forecasted_quantity < Decimal::ZERO {
            return Err(QuantityError::NegativeForecast {
                key: key.to_string(),
                value: forecasted_quantity,
            });
        }
        let on_hand = bounds.check(on_hand_quantity)?;
        Ok(Record {
            gap: gap::gap(forecasted_quantity, on_hand),
            key,
            forecasted_quantity,
            on_hand_quantity: on_hand,
            status: Status::Open,
            fulfilled_at: None,
        })
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn forecasted_quantity(&self) -> Decimal {
        self.forecasted_quantity
    }

    pub fn on_hand_quantity(&self) -> u32 {
        self.on_hand_quantity
    }

    pub fn gap(&self) -> Decimal {
        self.gap
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn fulfilled_at(&self) -> Option<OffsetDateTime> {
        self.fulfilled_at
    }

    pub fn is_open(&self) -> bool {
        self.status == Status::Open
    }

    /// Consume an open record and stamp it fulfilled at `now`.
    ///
    /// Returns the record unchanged in `Err` if it is already fulfilled.
    pub fn into_fulfilled(self, now: OffsetDateTime) -> Result<Record, Record> {
        if self.status != Status::Open {
            return Err(self);
        }
        Ok(Record {
            status: Status::Fulfilled,
            fulfilled_at: Some(now),
            ..self
        })
    }

    pub(crate) fn set_on_hand(&mut self, on_hand: u32) {
        self.on_hand_quantity = on_hand;
        self.gap = gap::gap(self.forecasted_quantity, on_hand);
    }

    /// Rebuild a fulfilled record from persisted fields.
    ///
    /// The gap is recomputed rather than trusted, so a persisted row can
    /// never carry a stale value back in.
    pub fn restore_fulfilled(
        key: RecordKey,
        forecasted_quantity: Decimal,
        on_hand_quantity: u32,
        fulfilled_at: OffsetDateTime,
    ) -> Record {
        Record {
            gap: gap::gap(forecasted_quantity, on_hand_quantity),
            key,
            forecasted_quantity,
            on_hand_quantity,
            status: Status::Fulfilled,
            fulfilled_at: Some(fulfilled_at),
        }
    }
}

/// Wire shape of a [`Record`]; `gap` is accepted but ignored.
#[derive(Deserialize)]
struct RecordRepr {
    key: RecordKey,
    forecasted_quantity: Decimal,
    on_hand_quantity: u32,
    #[serde(default)]
    #[allow(dead_code)]
    gap: Option<Decimal>,
    status: Status,
    #[serde(with = "time::serde::rfc3339::option", default)]
    fulfilled_at: Option<OffsetDateTime>,
}

impl TryFrom<RecordRepr> for Record {
    type Error = String;

    fn try_from(repr: RecordRepr) -> Result<Self, Self::Error> {
        if repr.forecasted_quantity < Decimal::ZERO {
            return Err(format!(
                "record {} has a negative forecast {}",
                repr.key, repr.forecasted_quantity
            ));
        }
        match (repr.status, repr.fulfilled_at) {
            (Status::Open, None) | (Status::Fulfilled, Some(_)) => {}
            (status, _) => {
                return Err(format!(
                    "record {} has status {} but fulfilled_at does not match",
                    repr.key, status
                ))
            }
        }
        Ok(Record {
            gap: gap::gap(repr.forecasted_quantity, repr.on_hand_quantity),
            key: repr.key,
            forecasted_quantity: repr.forecasted_quantity,
            on_hand_quantity: repr.on_hand_quantity,
            status: repr.status,
            fulfilled_at: repr.fulfilled_at,
        })
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn austin_snacks() -> RecordKey {
        RecordKey::new("Austin", "Snacks", date!(2019 - 01 - 05))
    }

    #[test]
    fn key_round_trips_through_text_form() {
        let key = austin_snacks();
        assert_eq!(key.to_string(), "Austin|Snacks|2019-01-05");
        assert_eq!("Austin|Snacks|2019-01-05".parse::<RecordKey>().unwrap(), key);
    }

    #[test]
    fn key_accepts_day_first_period() {
        let key: RecordKey = "Austin|Snacks|05-01-2019".parse().unwrap();
        assert_eq!(key, austin_snacks());
    }

    #[test]
    fn key_rejects_wrong_shape() {
        assert!(matches!(
            "Austin|Snacks".parse::<RecordKey>(),
            Err(KeyParseError::Shape(_))
        ));
        assert!(matches!(
            "|Snacks|2019-01-05".parse::<RecordKey>(),
            Err(KeyParseError::Shape(_))
        ));
        assert!(matches!(
            "Austin|Snacks|yesterday".parse::<RecordKey>(),
            Err(KeyParseError::Period { .. })
        ));
    }

    #[test]
    fn open_record_derives_gap() {
        let r = Record::open(
            austin_snacks(),
            Decimal::from(150),
            40,
            &QuantityBounds::default(),
        )
        .unwrap();
        assert_eq!(r.gap(), Decimal::from(110));
        assert_eq!(r.status(), Status::Open);
        assert!(r.fulfilled_at().is_none());
    }

    #[test]
    fn negative_forecast_rejected() {
        let err = Record::open(
            austin_snacks(),
            Decimal::from(-1),
            0,
            &QuantityBounds::default(),
        )
        .unwrap_err();
        assert!(matches!(err, QuantityError::NegativeForecast { .. }));
    }

    #[test]
    fn fulfil_stamps_timestamp_once() {
        let r = Record::open(austin_snacks(), Decimal::from(10), 0, &QuantityBounds::default())
            .unwrap();
        let now = datetime!(2025-03-01 10:00 UTC);
        let done = r.into_fulfilled(now).unwrap();
        assert_eq!(done.status(), Status::Fulfilled);
        assert_eq!(done.fulfilled_at(), Some(now));

        let again = done
            .clone()
            .into_fulfilled(datetime!(2025-03-02 10:00 UTC))
            .unwrap_err();
        assert_eq!(again.fulfilled_at(), Some(now));
    }

    #[test]
    fn status_labels() {
        assert_eq!(Status::parse_label("Pending"), Some(Status::Open));
        assert_eq!(Status::parse_label(""), Some(Status::Open));
        assert_eq!(Status::parse_label("Completed"), Some(Status::Fulfilled));
        assert_eq!(Status::parse_label("shipped"), None);
    }

    #[test]
    fn record_serializes_period_as_iso_date() {
        let r = Record::open(austin_snacks(), Decimal::from(3), 1, &QuantityBounds::default())
            .unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["key"]["period"], "2019-01-05");
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn deserialize_recomputes_stale_gap() {
        let json = serde_json::json!({
            "key": {"location": "Austin", "product": "Snacks", "period": "2019-01-05"},
            "forecasted_quantity": "150",
            "on_hand_quantity": 40,
            "gap": "999",
            "status": "Open",
            "fulfilled_at": null
        });
        let r: Record = serde_json::from_value(json).unwrap();
        assert_eq!(r.gap(), Decimal::from(110));
    }

    #[test]
    fn deserialize_rejects_open_record_with_timestamp() {
        let json = serde_json::json!({
            "key": {"location": "Austin", "product": "Snacks", "period": "2019-01-05"},
            "forecasted_quantity": "150",
            "on_hand_quantity": 40,
            "status": "Open",
            "fulfilled_at": "2025-03-01T10:00:00Z"
        });
        assert!(serde_json::from_value::<Record>(json).is_err());
    }
}

//! Gap calculation and on-hand quantity bounds.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Default upper bound for an on-hand quantity.
pub const DEFAULT_MAX_ON_HAND: u32 = 10_000;

/// Inclusive bounds for operator-entered on-hand quantities: `0..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityBounds {
    pub max: u32,
}

impl Default for QuantityBounds {
    fn default() -> Self {
        QuantityBounds {
            max: DEFAULT_MAX_ON_HAND,
        }
    }
}

impl QuantityBounds {
    pub fn new(max: u32) -> Self {
        QuantityBounds { max }
    }

    /// Validate a candidate on-hand value.
    pub fn check(&self, value: i64) -> Result<u32, QuantityError> {
        if value < 0 {
            return Err(QuantityError::Negative { value });
        }
        if value > i64::from(self.max) {
            return Err(QuantityError::AboveMaximum {
                value,
                max: self.max,
            });
        }
        Ok(value as u32)
    }
}

/// A quantity failed validation. The record it was meant for is untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    #[error("on-hand quantity {value} is negative")]
    Negative { value: i64 },
    #[error("on-hand quantity {value} exceeds the maximum of {max}")]
    AboveMaximum { value: i64, max: u32 },
    #[error("forecasted quantity {value} for {key} is negative")]
    NegativeForecast { key: String, value: Decimal },
}

/// `forecasted - on_hand`. Negative means surplus.
pub fn gap(forecasted: Decimal, on_hand: u32) -> Decimal {
    forecasted - Decimal::from(on_hand)
}

/// Return a copy of `record` with `on_hand` applied and the gap recomputed.
///
/// Pure: `record` itself is never modified, so a rejected value leaves the
/// caller's record exactly as it was.
pub fn recompute(
    record: &Record,
    on_hand: i64,
    bounds: &QuantityBounds,
) -> Result<Record, QuantityError> {
    let value = bounds.check(on_hand)?;
    let mut next = record.clone();
    next.set_on_hand(value);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKey;
    use time::macros::date;

    fn record(forecast: i64, on_hand: i64) -> Record {
        Record::open(
            RecordKey::new("Austin", "Snacks", date!(2019 - 01 - 05)),
            Decimal::from(forecast),
            on_hand,
            &QuantityBounds::default(),
        )
        .unwrap()
    }

    #[test]
    fn recompute_updates_gap() {
        let r = record(150, 0);
        let next = recompute(&r, 40, &QuantityBounds::default()).unwrap();
        assert_eq!(next.on_hand_quantity(), 40);
        assert_eq!(next.gap(), Decimal::from(110));
        // original untouched
        assert_eq!(r.gap(), Decimal::from(150));
    }

    #[test]
    fn surplus_gives_negative_gap() {
        let next = recompute(&record(10, 0), 25, &QuantityBounds::default()).unwrap();
        assert_eq!(next.gap(), Decimal::from(-15));
    }

    #[test]
    fn fractional_forecast_kept_exact() {
        let r = Record::open(
            RecordKey::new("Yangon", "Health and beauty", date!(2019 - 03 - 08)),
            "12.75".parse().unwrap(),
            3,
            &QuantityBounds::default(),
        )
        .unwrap();
        assert_eq!(r.gap(), "9.75".parse::<Decimal>().unwrap());
    }

    #[test]
    fn upper_bound_inclusive() {
        let bounds = QuantityBounds::default();
        assert!(recompute(&record(5, 0), 10_000, &bounds).is_ok());
        assert_eq!(
            recompute(&record(5, 0), 10_001, &bounds).unwrap_err(),
            QuantityError::AboveMaximum {
                value: 10_001,
                max: 10_000
            }
        );
    }

    #[test]
    fn negative_rejected() {
        assert_eq!(
            recompute(&record(5, 0), -1, &QuantityBounds::default()).unwrap_err(),
            QuantityError::Negative { value: -1 }
        );
    }

    #[test]
    fn custom_bound() {
        let bounds = QuantityBounds::new(50);
        assert!(bounds.check(50).is_ok());
        assert!(bounds.check(51).is_err());
    }
}

//! Read-only CSV export of the open set.

use std::io;

use serde::Serialize;

use crate::lifecycle::OpenSlot;

pub const EXPORT_COLUMNS: [&str; 8] = [
    "location",
    "product",
    "period",
    "forecasted_quantity",
    "on_hand_quantity",
    "gap",
    "status",
    "staged",
];

#[derive(Serialize)]
struct ExportRow<'a> {
    location: &'a str,
    product: &'a str,
    period: String,
    forecasted_quantity: String,
    on_hand_quantity: u32,
    gap: String,
    status: &'static str,
    staged: bool,
}

/// Write `slots` as CSV with a header row. Returns the number of data rows.
pub fn write_csv<W: io::Write>(slots: &[OpenSlot], out: W) -> Result<usize, csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    if slots.is_empty() {
        writer.write_record(EXPORT_COLUMNS)?;
    }
    for slot in slots {
        let record = &slot.record;
        let key = record.key();
        writer.serialize(ExportRow {
            location: &key.location,
            product: &key.product,
            period: key.period.to_string(),
            forecasted_quantity: record.forecasted_quantity().to_string(),
            on_hand_quantity: record.on_hand_quantity(),
            gap: record.gap().to_string(),
            status: record.status().as_str(),
            staged: slot.staged,
        })?;
    }
    writer.flush()?;
    Ok(slots.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use restock_core::{QuantityBounds, Record, RecordKey};
    use rust_decimal::Decimal;
    use time::macros::date;

    #[test]
    fn writes_header_and_rows() {
        let record = Record::open(
            RecordKey::new("Austin", "Snacks", date!(2019 - 01 - 05)),
            Decimal::new(1505, 1),
            40,
            &QuantityBounds::default(),
        )
        .unwrap();
        let slots = vec![OpenSlot {
            record,
            staged: true,
        }];

        let mut out = Vec::new();
        assert_eq!(write_csv(&slots, &mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(EXPORT_COLUMNS.join(",").as_str()));
        assert_eq!(
            lines.next(),
            Some("Austin,Snacks,2019-01-05,150.5,40,110.5,Open,true")
        );
    }

    #[test]
    fn empty_open_set_still_has_header() {
        let mut out = Vec::new();
        write_csv(&[], &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap().trim_end(),
            EXPORT_COLUMNS.join(",")
        );
    }
}

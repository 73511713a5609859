use restock_storage::{CsvLedger, HistoryLedger};
use time::format_description::well_known::Rfc3339;
use time::Date;

use super::print_json;
use crate::config::RestockConfig;
use crate::OutputFormat;

/// Fulfilled records between `from` and `to` (inclusive, UTC dates).
/// Either bound defaults to the ledger's earliest or latest date. The
/// history file is only read, never locked or repaired.
pub(crate) async fn cmd_history(
    config: RestockConfig,
    from: Option<Date>,
    to: Option<Date>,
    output: OutputFormat,
) -> Result<(), String> {
    let (ledger, _) = CsvLedger::read(config.ledger.path.clone())
        .await
        .map_err(|e| format!("history ledger '{}': {}", config.ledger.path.display(), e))?;

    let bounds = ledger.bounds().await.map_err(|e| e.to_string())?;
    let range = match (bounds, from, to) {
        (_, Some(start), Some(end)) => Some((start, end)),
        (Some((first, last)), start, end) => Some((start.unwrap_or(first), end.unwrap_or(last))),
        (None, _, _) => None,
    };
    let entries = match range {
        Some((start, end)) => ledger
            .query_range(start, end)
            .await
            .map_err(|e| e.to_string())?
            .to_vec(),
        None => Vec::new(),
    };

    match output {
        OutputFormat::Json => {
            let list: Vec<serde_json::Value> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "key": e.key.to_string(),
                        "forecasted_quantity": e.forecasted_quantity.to_string(),
                        "on_hand_quantity": e.on_hand_quantity,
                        "gap": e.gap.to_string(),
                        "fulfilled_at": e.fulfilled_at.format(&Rfc3339).unwrap_or_default(),
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "from": range.map(|(s, _)| s.to_string()),
                "to": range.map(|(_, e)| e.to_string()),
                "entries": list,
            }));
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("no fulfilled records in range");
            }
            for e in &entries {
                println!(
                    "{}  {}  forecast={} on_hand={} gap={}",
                    e.fulfilled_at.format(&Rfc3339).unwrap_or_default(),
                    e.key,
                    e.forecasted_quantity,
                    e.on_hand_quantity,
                    e.gap
                );
            }
        }
    }
    Ok(())
}

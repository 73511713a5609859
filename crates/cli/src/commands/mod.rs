mod alerts;
mod edit;
mod export;
mod history;
mod ingest;
mod operator;
mod pending;

pub(crate) use alerts::cmd_alerts;
pub(crate) use edit::{cmd_edit, parse_stock_edit, EditArgs};
pub(crate) use export::cmd_export;
pub(crate) use history::cmd_history;
pub(crate) use ingest::cmd_ingest;
pub(crate) use operator::cmd_operator_add;
pub(crate) use pending::cmd_pending;

use std::collections::BTreeSet;

use restock_core::{AlertKind, Record};

pub(crate) fn print_json(value: &serde_json::Value) {
    let pretty =
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("{}", pretty);
}

fn alert_labels(alerts: &BTreeSet<AlertKind>) -> Vec<&'static str> {
    alerts.iter().map(AlertKind::label).collect()
}

fn record_json(record: &Record) -> serde_json::Value {
    serde_json::json!({
        "key": record.key().to_string(),
        "location": record.key().location,
        "product": record.key().product,
        "period": record.key().period.to_string(),
        "forecasted_quantity": record.forecasted_quantity().to_string(),
        "on_hand_quantity": record.on_hand_quantity(),
        "gap": record.gap().to_string(),
    })
}

fn record_line(record: &Record) -> String {
    format!(
        "{}  forecast={} on_hand={} gap={}",
        record.key(),
        record.forecasted_quantity(),
        record.on_hand_quantity(),
        record.gap()
    )
}

use restock_core::alert;

use super::{alert_labels, print_json, record_json, record_line};
use crate::config::RestockConfig;
use crate::session::Session;
use crate::OutputFormat;

pub(crate) async fn cmd_pending(
    config: RestockConfig,
    location: &str,
    product: &str,
    limit: Option<usize>,
    output: OutputFormat,
) -> Result<(), String> {
    let limit = limit.unwrap_or(config.session.page_size);
    let session = Session::open(config).await?;
    let engine = &session.engine;

    let matches = engine.filter(location, product);
    let total = matches.len();
    let thresholds = engine.config().thresholds;
    let staged: std::collections::HashSet<_> = engine.staged_keys().into_iter().collect();

    match output {
        OutputFormat::Json => {
            let records: Vec<serde_json::Value> = matches
                .iter()
                .take(limit)
                .map(|r| {
                    let mut v = record_json(r);
                    v["staged"] = serde_json::Value::Bool(staged.contains(r.key()));
                    v["alerts"] = serde_json::json!(alert_labels(&alert::evaluate(r, &thresholds)));
                    v
                })
                .collect();
            print_json(&serde_json::json!({ "total": total, "records": records }));
        }
        OutputFormat::Text => {
            for r in matches.iter().take(limit) {
                let mut line = record_line(r);
                if staged.contains(r.key()) {
                    line.push_str("  [staged]");
                }
                let alerts = alert_labels(&alert::evaluate(r, &thresholds));
                if !alerts.is_empty() {
                    line.push_str(&format!("  ({})", alerts.join(", ")));
                }
                println!("{}", line);
            }
            if total > limit {
                println!("... {} more (use --limit to show more)", total - limit);
            }
            if total == 0 {
                println!("no open records match");
            }
        }
    }
    Ok(())
}

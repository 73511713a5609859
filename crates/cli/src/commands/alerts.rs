use super::{print_json, record_json, record_line};
use crate::config::RestockConfig;
use crate::session::Session;
use crate::OutputFormat;

pub(crate) async fn cmd_alerts(config: RestockConfig, output: OutputFormat) -> Result<(), String> {
    let session = Session::open(config).await?;
    let engine = &session.engine;
    let thresholds = engine.config().thresholds;
    let summary = engine.alert_summary();
    let low = engine.low_stock();

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "thresholds": { "low_stock": thresholds.low_stock, "high_gap": thresholds.high_gap },
            "summary": summary,
            "low_stock": low.iter().map(record_json).collect::<Vec<_>>(),
        })),
        OutputFormat::Text => {
            println!(
                "low stock (< {}): {}",
                thresholds.low_stock, summary.low_stock
            );
            println!("high gap (> {}): {}", thresholds.high_gap, summary.high_gap);
            for r in &low {
                println!("  {}", record_line(r));
            }
        }
    }
    Ok(())
}

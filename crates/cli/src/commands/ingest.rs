use std::fs::File;
use std::path::Path;

use restock_engine::{ColumnForecast, ForecastProvider, StaticForecast};

use super::print_json;
use crate::config::RestockConfig;
use crate::session::{authorize, Session};
use crate::OutputFormat;

pub(crate) async fn cmd_ingest(
    config: RestockConfig,
    dataset: &Path,
    forecast: Option<&Path>,
    operator: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    authorize(&config, operator)?;

    let provider: Box<dyn ForecastProvider> = match forecast {
        Some(path) => Box::new(StaticForecast::from_path(path).map_err(|e| e.to_string())?),
        None => Box::new(ColumnForecast),
    };
    let file = File::open(dataset)
        .map_err(|e| format!("error reading file '{}': {}", dataset.display(), e))?;

    let session = Session::open(config).await?;
    let report = restock_engine::ingest(&session.engine, file, provider.as_ref())
        .await
        .map_err(|e| format!("ingest '{}': {}", dataset.display(), e))?;
    session.save()?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "rows": report.rows,
            "seeded": report.seeded.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "in_ledger": report.in_ledger.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "duplicates": report.duplicates.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "already_completed": report.already_completed.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "rejected": report.rejected,
            "open": session.engine.len(),
        })),
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "ingested {} rows: {} seeded, {} already fulfilled, {} duplicate, {} completed in dataset, {} rejected",
                    report.rows,
                    report.seeded.len(),
                    report.in_ledger.len(),
                    report.duplicates.len(),
                    report.already_completed.len(),
                    report.rejected.len()
                );
                for r in &report.rejected {
                    println!("  line {}: {}", r.line, r.reason);
                }
                println!("{} open records", session.engine.len());
            }
        }
    }
    Ok(())
}

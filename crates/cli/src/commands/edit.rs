//! One editing pass: apply stock edits and status changes, then commit
//! every staged record to the history ledger.

use restock_core::{RecordKey, Status};
use time::OffsetDateTime;

use super::print_json;
use crate::config::RestockConfig;
use crate::session::{authorize, Session};
use crate::OutputFormat;

pub(crate) struct EditArgs {
    pub stock: Vec<(RecordKey, i64)>,
    pub complete: Vec<RecordKey>,
    pub reopen: Vec<RecordKey>,
}

/// Parse `KEY=N` where KEY is `location|product|YYYY-MM-DD`.
pub(crate) fn parse_stock_edit(s: &str) -> Result<(RecordKey, i64), String> {
    let (key, value) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected KEY=N, got '{}'", s))?;
    let key: RecordKey = key.parse().map_err(|e| format!("{}", e))?;
    let value: i64 = value
        .trim()
        .parse()
        .map_err(|_| format!("on-hand quantity '{}' is not a whole number", value.trim()))?;
    Ok((key, value))
}

pub(crate) async fn cmd_edit(
    config: RestockConfig,
    args: EditArgs,
    operator: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), String> {
    authorize(&config, operator)?;
    let session = Session::open(config).await?;
    let engine = &session.engine;

    // Edits are applied in order: stock, reopen, complete. A rejected edit
    // is reported and leaves its record unchanged.
    let mut rejected: Vec<(RecordKey, String)> = Vec::new();
    for (key, value) in &args.stock {
        if let Err(e) = engine.update_on_hand(key, *value) {
            rejected.push((key.clone(), e.to_string()));
        }
    }
    for key in &args.reopen {
        if let Err(e) = engine.set_status(key, Status::Open) {
            rejected.push((key.clone(), e.to_string()));
        }
    }
    for key in &args.complete {
        if let Err(e) = engine.set_status(key, Status::Fulfilled) {
            rejected.push((key.clone(), e.to_string()));
        }
    }

    let report = engine
        .commit_batch(engine.staged_keys(), OffsetDateTime::now_utc())
        .await;
    session.save()?;

    match output {
        OutputFormat::Json => print_json(&serde_json::json!({
            "moved": report.moved.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "failed": report.failed.iter().map(|(k, e)| serde_json::json!({
                "key": k.to_string(),
                "error": e.to_string(),
            })).collect::<Vec<_>>(),
            "rejected": rejected.iter().map(|(k, e)| serde_json::json!({
                "key": k.to_string(),
                "error": e,
            })).collect::<Vec<_>>(),
            "open": engine.len(),
        })),
        OutputFormat::Text => {
            if !quiet {
                for (key, reason) in &rejected {
                    println!("rejected {}: {}", key, reason);
                }
                for key in &report.moved {
                    println!("fulfilled {}", key);
                }
                for (key, e) in &report.failed {
                    println!("not committed {}: {}", key, e);
                }
                println!(
                    "{} fulfilled, {} not committed, {} open",
                    report.moved.len(),
                    report.failed.len(),
                    engine.len()
                );
            }
        }
    }

    let problems = rejected.len() + report.failed.len();
    if problems > 0 {
        return Err(format!("{} edit(s) or commit(s) did not apply", problems));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parses_key_equals_value() {
        let (key, value) = parse_stock_edit("Yangon|Health and beauty|05-01-2019=12").unwrap();
        assert_eq!(key.location, "Yangon");
        assert_eq!(key.period, date!(2019 - 01 - 05));
        assert_eq!(value, 12);
    }

    #[test]
    fn negative_value_parses_and_is_left_to_the_engine() {
        let (_, value) = parse_stock_edit("A|B|2019-01-05=-1").unwrap();
        assert_eq!(value, -1);
    }

    #[test]
    fn rejects_malformed_edits() {
        assert!(parse_stock_edit("A|B|2019-01-05").is_err());
        assert!(parse_stock_edit("A|B|2019-01-05=lots").is_err());
        assert!(parse_stock_edit("A|2019-01-05=3").is_err());
    }
}

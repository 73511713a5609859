use std::fs::File;
use std::io;
use std::path::Path;

use crate::config::RestockConfig;
use crate::session::Session;

/// Write the open set as CSV to `out`, or to stdout.
pub(crate) async fn cmd_export(
    config: RestockConfig,
    out: Option<&Path>,
    quiet: bool,
) -> Result<(), String> {
    let session = Session::open(config).await?;
    let slots = session.engine.snapshot();

    match out {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("error writing file '{}': {}", path.display(), e))?;
            let rows = restock_engine::export::write_csv(&slots, file)
                .map_err(|e| format!("export: {}", e))?;
            if !quiet {
                eprintln!("wrote {} rows to {}", rows, path.display());
            }
        }
        None => {
            restock_engine::export::write_csv(&slots, io::stdout().lock())
                .map_err(|e| format!("export: {}", e))?;
        }
    }
    Ok(())
}

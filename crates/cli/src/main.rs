mod commands;
mod config;
mod session;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use restock_core::{parse_period, RecordKey};
use restock_engine::Role;
use time::Date;
use tracing_subscriber::EnvFilter;

use commands::EditArgs;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Store replenishment tracker.
#[derive(Parser)]
#[command(name = "restock", version, about = "Store replenishment tracker")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "restock.toml")]
    config: PathBuf,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log progress to stderr (overridden by RESTOCK_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Operator name, required for changes when a users file is configured
    #[arg(long, global = true)]
    operator: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a store dataset into the working set
    Ingest {
        /// Path to the dataset CSV
        dataset: PathBuf,
        /// CSV of key,forecasted_quantity (default: the dataset's Predicted Quantity column)
        #[arg(long)]
        forecast: Option<PathBuf>,
    },

    /// List open records, optionally filtered
    Pending {
        /// Case-insensitive location substring
        #[arg(long, default_value = "")]
        location: String,
        /// Case-insensitive product line substring
        #[arg(long, default_value = "")]
        product: String,
        /// Maximum rows to show (default: session.page_size)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Apply edits, then commit every staged record to the history
    Edit {
        /// Set on-hand stock: KEY=N, KEY is location|product|YYYY-MM-DD
        #[arg(long, value_parser = commands::parse_stock_edit)]
        stock: Vec<(RecordKey, i64)>,
        /// Mark a record fulfilled
        #[arg(long)]
        complete: Vec<RecordKey>,
        /// Take a record back to open before it is committed
        #[arg(long)]
        reopen: Vec<RecordKey>,
    },

    /// Alert counts and the low-stock list
    Alerts,

    /// Fulfilled records in a date range
    History {
        /// First fulfilment date (YYYY-MM-DD), default: earliest
        #[arg(long, value_parser = parse_date)]
        from: Option<Date>,
        /// Last fulfilment date (YYYY-MM-DD), default: latest
        #[arg(long, value_parser = parse_date)]
        to: Option<Date>,
    },

    /// Write the open set as CSV
    Export {
        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Manage operators
    Operator {
        #[command(subcommand)]
        command: OperatorCommands,
    },
}

#[derive(Subcommand)]
enum OperatorCommands {
    /// Register an operator (password from RESTOCK_PASSWORD)
    Add {
        username: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
    },
}

fn parse_date(s: &str) -> Result<Date, String> {
    parse_period(s)
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse::<Role>().map_err(|e| e.to_string())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("RESTOCK_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = cli.output;
    let quiet = cli.quiet;

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };

    if let Err(msg) = rt.block_on(run(cli)) {
        report_error(&msg, output, quiet);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = config::read_config(&cli.config)?;
    let operator = cli.operator.as_deref();

    match cli.command {
        Commands::Ingest { dataset, forecast } => {
            commands::cmd_ingest(
                config,
                &dataset,
                forecast.as_deref(),
                operator,
                cli.output,
                cli.quiet,
            )
            .await
        }
        Commands::Pending {
            location,
            product,
            limit,
        } => commands::cmd_pending(config, &location, &product, limit, cli.output).await,
        Commands::Edit {
            stock,
            complete,
            reopen,
        } => {
            let args = EditArgs {
                stock,
                complete,
                reopen,
            };
            commands::cmd_edit(config, args, operator, cli.output, cli.quiet).await
        }
        Commands::Alerts => commands::cmd_alerts(config, cli.output).await,
        Commands::History { from, to } => commands::cmd_history(config, from, to, cli.output).await,
        Commands::Export { out } => commands::cmd_export(config, out.as_deref(), cli.quiet).await,
        Commands::Operator {
            command: OperatorCommands::Add { username, role },
        } => commands::cmd_operator_add(&config, &username, role, cli.output, cli.quiet),
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

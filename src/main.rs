//! Claims Ledger CLI
//!
//! Operational entrypoint for the claim numbering subsystem.
//!
//! ## Usage
//!
//! ```bash
//! # Report what a backfill would assign, without writing anything
//! claims-ledger backfill --dry-run
//!
//! # Assign numbers to all unnumbered claims
//! claims-ledger backfill
//!
//! # Database statistics
//! claims-ledger stats
//!
//! # Custom database location or config file
//! claims-ledger --db-path /data/claims.db stats
//! claims-ledger --config /etc/claims-ledger.toml backfill
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use claims_ledger::services::events::spawn_logging_listener;
use claims_ledger::{BackfillDriver, ClaimsDb, Config, EventBus};

#[derive(Parser)]
#[command(name = "claims-ledger", about = "Claim numbering and lifecycle audit")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, env = "CLAIMS_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the database path
    #[arg(long, env = "CLAIMS_LEDGER_DB")]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assign claim numbers to historical unnumbered claims
    Backfill {
        /// Report planned assignments without writing or consuming numbers
        #[arg(long)]
        dry_run: bool,
    },
    /// Print database statistics
    Stats,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    let db = Arc::new(ClaimsDb::open(&config.db_path)?);
    let events = Arc::new(EventBus::new());
    let _listener = spawn_logging_listener(events.clone());

    match cli.command {
        Command::Backfill { dry_run: true } => {
            let driver = BackfillDriver::new(db, events);
            let plan = driver.plan()?;
            info!(
                planned = plan.planned.len(),
                failures = plan.failures.len(),
                "Dry run finished"
            );
            println!("{}", serde_json::to_string_pretty(&plan)?);
            if !plan.failures.is_empty() {
                std::process::exit(2);
            }
        }
        Command::Backfill { dry_run: false } => {
            let driver =
                BackfillDriver::new(db, events).with_retry_policy(config.retry_policy());
            let report = driver.run()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.failures.is_empty() {
                std::process::exit(2);
            }
        }
        Command::Stats => {
            let stats = db.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

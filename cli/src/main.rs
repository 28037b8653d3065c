//! ledgerreset CLI: operator entry point for discarding ingestion data.
//!
//! Usage:
//! ```bash
//! ledgerreset --database-url postgresql://localhost/horizon truncate-state --yes
//! ledgerreset --config reset.json rollback --cutoff 1000 --atomic --yes
//! ledgerreset info
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use ledgerreset_core::config::Backend;
use ledgerreset_core::{
    AtomicScope, DeleteExecutor, HistoryRollback, HistoryTable, RemovalSummary, ResetConfig,
    StateTable, StateTruncator,
};
use ledgerreset_storage::postgres::PostgresStore;
use ledgerreset_storage::sqlite::SqliteStore;

mod logging;

#[derive(Parser)]
#[command(
    name = "ledgerreset",
    about = "Truncate ingestion state tables or roll back ledger history",
    long_about = "
Discards derived ingestion data so that ingestion can restart from a known point.
Stop ingestion before running a destructive command, and do not resume it if the
command exits with an error.

ENVIRONMENT VARIABLES:
  LEDGERRESET_DATABASE_URL   sqlite:<path> or postgresql://... (overrides the config file)
",
    version
)]
struct Cli {
    /// Database URL
    #[arg(long, global = true, env = "LEDGERRESET_DATABASE_URL")]
    database_url: Option<String>,

    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Abort any single delete running longer than this
    #[arg(long, global = true)]
    statement_timeout_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete every row from the ingestion state tables
    #[command(name = "truncate-state")]
    TruncateState {
        /// Run all deletes in a single transaction
        #[arg(long)]
        atomic: bool,
        /// Confirm the destructive operation
        #[arg(long)]
        yes: bool,
    },

    /// Delete history rows recorded after the cutoff ledger
    Rollback {
        /// Last ledger sequence to keep
        #[arg(long)]
        cutoff: u32,
        /// Run both deletes in a single transaction
        #[arg(long)]
        atomic: bool,
        /// Confirm the destructive operation
        #[arg(long)]
        yes: bool,
    },

    /// Show which tables each command touches
    Info,
}

#[derive(Debug, Serialize)]
struct RollbackReport {
    cutoff: u32,
    #[serde(flatten)]
    summary: RemovalSummary,
    /// First ledger ingestion should process next.
    resume_from: Option<u32>,
    atomic: bool,
    finished_at: String,
}

#[derive(Debug, Serialize)]
struct TruncateReport {
    tables: Vec<&'static str>,
    atomic: bool,
    finished_at: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Info = cli.command {
        cmd_info(cli.json)?;
        return Ok(());
    }

    let mut config = resolve_config(&cli)?;
    if cli.verbose {
        config.log.level = "debug".into();
    }
    logging::init_tracing(&config.log)?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::TruncateState { atomic, yes } => {
            require_confirmation(yes, "truncate-state")?;
            config.atomic |= atomic;
            with_store(&config, |store| cmd_truncate(store, &config, cli.json)).await
        }
        Commands::Rollback { cutoff, atomic, yes } => {
            require_confirmation(yes, "rollback")?;
            config.atomic |= atomic;
            with_store(&config, |store| cmd_rollback(store, &config, cutoff, cli.json)).await
        }
        Commands::Info => Ok(()),
    }
}

/// Config file first, then CLI flags / environment on top.
fn resolve_config(cli: &Cli) -> Result<ResetConfig> {
    let mut config = match &cli.config {
        Some(path) => ResetConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ResetConfig::default(),
    };
    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }
    if let Some(ms) = cli.statement_timeout_ms {
        config.statement_timeout_ms = Some(ms);
    }
    Ok(config)
}

fn require_confirmation(yes: bool, command: &str) -> Result<()> {
    if !yes {
        bail!("{command} permanently deletes ingestion data; re-run with --yes to confirm");
    }
    Ok(())
}

/// Open the configured backend and hand it to `run`.
async fn with_store<F, Fut>(config: &ResetConfig, run: F) -> Result<()>
where
    F: FnOnce(Store) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let store = match config.backend()? {
        Backend::Sqlite => Store::Sqlite(
            SqliteStore::open_with_options(&config.database_url, &config.pool).await?,
        ),
        Backend::Postgres => Store::Postgres(
            PostgresStore::connect_with_options(&config.database_url, &config.pool).await?,
        ),
    };
    run(store).await
}

enum Store {
    Sqlite(SqliteStore),
    Postgres(PostgresStore),
}

async fn cmd_truncate(store: Store, config: &ResetConfig, json: bool) -> Result<()> {
    match store {
        Store::Sqlite(s) => truncate_with(s, config).await?,
        Store::Postgres(s) => truncate_with(s, config).await?,
    }

    let report = TruncateReport {
        tables: StateTable::ALL.iter().map(|t| t.name()).collect(),
        atomic: config.atomic,
        finished_at: chrono::Utc::now().to_rfc3339(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Truncated {} state tables: {}", report.tables.len(), report.tables.join(", "));
        println!("Re-populate state from a history archive snapshot before resuming ingestion.");
    }
    Ok(())
}

async fn truncate_with<S>(store: S, config: &ResetConfig) -> Result<()>
where
    S: DeleteExecutor + AtomicScope,
{
    let mut truncator = StateTruncator::new(store);
    if let Some(timeout) = config.statement_timeout() {
        truncator = truncator.with_statement_timeout(timeout);
    }

    let result = if config.atomic {
        truncator.truncate_atomic().await
    } else {
        truncator.truncate().await
    };
    if let Err(e) = &result {
        error!(
            error = %e,
            atomic = config.atomic,
            "state truncation failed; state tables are unusable until a truncation succeeds"
        );
    } else {
        info!(atomic = config.atomic, "state tables truncated");
    }
    result.context("truncating state tables")
}

async fn cmd_rollback(store: Store, config: &ResetConfig, cutoff: u32, json: bool) -> Result<()> {
    let summary = match store {
        Store::Sqlite(s) => rollback_with(s, config, cutoff).await?,
        Store::Postgres(s) => rollback_with(s, config, cutoff).await?,
    };

    let report = RollbackReport {
        cutoff,
        summary,
        resume_from: cutoff.checked_add(1),
        atomic: config.atomic,
        finished_at: chrono::Utc::now().to_rfc3339(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Rolled back history after ledger {cutoff}");
        println!("  ledgers removed:      {}", summary.ledgers_removed);
        println!("  transactions removed: {}", summary.transactions_removed);
        match report.resume_from {
            Some(next) => println!("Resume ingestion at ledger {next}."),
            None => println!("Cutoff is the last representable ledger; nothing to resume."),
        }
    }
    Ok(())
}

async fn rollback_with<S>(store: S, config: &ResetConfig, cutoff: u32) -> Result<RemovalSummary>
where
    S: DeleteExecutor + AtomicScope,
{
    let mut rollback = HistoryRollback::new(store);
    if let Some(timeout) = config.statement_timeout() {
        rollback = rollback.with_statement_timeout(timeout);
    }

    let result = if config.atomic {
        rollback.rollback_atomic(cutoff).await
    } else {
        rollback.rollback(cutoff).await
    };
    match result {
        Ok(summary) => {
            info!(
                cutoff,
                ledgers = summary.ledgers_removed,
                transactions = summary.transactions_removed,
                "history rolled back"
            );
            Ok(summary)
        }
        Err(e) => {
            if !e.partial.is_empty() {
                warn!(
                    ledgers = e.partial.ledgers_removed,
                    transactions = e.partial.transactions_removed,
                    "rollback stopped part way; re-running with the same cutoff is safe"
                );
            }
            error!(cutoff, error = %e.source, "history rollback failed");
            Err(e).context(format!("rolling back history after ledger {cutoff}"))
        }
    }
}

fn cmd_info(json: bool) -> Result<()> {
    let state: Vec<&str> = StateTable::ALL.iter().map(|t| t.name()).collect();
    let history: Vec<(&str, &str)> = HistoryTable::ALL
        .iter()
        .map(|t| (t.name(), t.sequence_column()))
        .collect();

    if json {
        let info = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "state_tables": state,
            "history_tables": history
                .iter()
                .map(|(name, column)| {
                    serde_json::json!({ "table": name, "sequence_column": column })
                })
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("ledgerreset v{}", env!("CARGO_PKG_VERSION"));
    println!("  truncate-state clears: {}", state.join(", "));
    println!("  rollback deletes (in order):");
    for (name, column) in history {
        println!("    {name} where {column} > cutoff");
    }
    println!("  Backends: sqlite:<path>, postgresql://...");
    Ok(())
}

//! SQLite storage backend.
//!
//! Runs reset deletes against an existing ingestion database file through a
//! `sqlx` pool. The schema is owned by the ingestion side; this backend never
//! creates tables.
//!
//! # Usage
//! ```rust,no_run
//! use ledgerreset_core::HistoryRollback;
//! use ledgerreset_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("./horizon.db").await?;
//! let summary = HistoryRollback::new(&store).rollback(1_000).await?;
//! println!("removed {} ledgers", summary.ledgers_removed);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::info;

use ledgerreset_core::config::PoolConfig;
use ledgerreset_core::delete::{
    AtomicScope, DeleteExecutor, DeleteSpec, Placeholder, StoreTransaction,
};
use ledgerreset_core::error::ResetError;

use crate::outcome::SqlOutcome;

/// SQLite-backed reset target.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open an existing SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./horizon.db"`) or a full
    /// SQLite URL (`"sqlite:./horizon.db"`). A missing file is an error.
    pub async fn open(path: &str) -> Result<Self, ResetError> {
        Self::open_with_options(path, &PoolConfig::default()).await
    }

    /// Open with explicit pool settings.
    pub async fn open_with_options(path: &str, opts: &PoolConfig) -> Result<Self, ResetError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(opts.connect_timeout_secs))
            .connect(&url)
            .await
            .map_err(|e| ResetError::Storage(format!("sqlite open {url}: {e}")))?;

        info!(url = %url, "SqliteStore opened");
        Ok(Self { pool })
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool holds a single connection that never expires, since every
    /// connection to `sqlite::memory:` is its own database. Ideal for tests.
    pub async fn in_memory() -> Result<Self, ResetError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| ResetError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (e.g. for ingestion-side writes in tests).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of rows currently in `table`.
    pub async fn row_count(&self, table: &str) -> Result<i64, ResetError> {
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM \"{}\"",
            table.replace('"', "\"\"")
        );
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ResetError::Storage(e.to_string()))?;
        Ok(row.get::<i64, _>("cnt"))
    }
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    spec: &DeleteSpec,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match spec.bind_value() {
        Some(value) => query.bind(value),
        None => query,
    }
}

fn exec_error(spec: &DeleteSpec, e: sqlx::Error) -> ResetError {
    ResetError::Exec {
        table: spec.table().to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl DeleteExecutor for SqliteStore {
    type Outcome = SqlOutcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<SqlOutcome, ResetError> {
        let sql = spec.to_sql(Placeholder::Question);
        let result = bind(sqlx::query(&sql), spec)
            .execute(&self.pool)
            .await
            .map_err(|e| exec_error(spec, e))?;

        Ok(SqlOutcome {
            table: spec.table(),
            rows: result.rows_affected(),
        })
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

/// An open SQLite transaction. Rolled back by `sqlx` if dropped uncommitted.
pub struct SqliteTx {
    tx: Mutex<Transaction<'static, Sqlite>>,
}

#[async_trait]
impl DeleteExecutor for SqliteTx {
    type Outcome = SqlOutcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<SqlOutcome, ResetError> {
        let sql = spec.to_sql(Placeholder::Question);
        let mut tx = self.tx.lock().await;
        let result = bind(sqlx::query(&sql), spec)
            .execute(&mut **tx)
            .await
            .map_err(|e| exec_error(spec, e))?;

        Ok(SqlOutcome {
            table: spec.table(),
            rows: result.rows_affected(),
        })
    }
}

#[async_trait]
impl StoreTransaction for SqliteTx {
    async fn commit(self) -> Result<(), ResetError> {
        self.tx
            .into_inner()
            .commit()
            .await
            .map_err(|e| ResetError::Storage(format!("commit: {e}")))
    }
}

#[async_trait]
impl AtomicScope for SqliteStore {
    type Tx = SqliteTx;

    async fn begin(&self) -> Result<SqliteTx, ResetError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ResetError::Storage(format!("begin: {e}")))?;
        Ok(SqliteTx { tx: Mutex::new(tx) })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

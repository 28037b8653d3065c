//! The delete-execution contract between reset operations and a store.
//!
//! Reset operations build exactly two shapes of statement:
//! - `DELETE FROM <table>` for every state table
//! - `DELETE FROM <table> WHERE <column> > <value>` for history tables
//!
//! A backend executes a [`DeleteSpec`] and reports the affected row count
//! through an [`ExecOutcome`]. Backends that support transactions also
//! implement [`AtomicScope`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ResetError;
use crate::tables::{HistoryTable, StateTable};

// ─── DeleteSpec ───────────────────────────────────────────────────────────────

/// `<column> > <value>` filter on an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predicate {
    pub column: &'static str,
    pub value: i64,
}

/// Bind-parameter syntax of the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (SQLite, MySQL)
    Question,
    /// `$1` (PostgreSQL)
    Numbered,
}

/// A delete statement against one of the fixed reset tables.
///
/// Can only be built from [`StateTable`] or [`HistoryTable`], so the table
/// and column names are always compile-time constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteSpec {
    table: &'static str,
    predicate: Option<Predicate>,
}

impl DeleteSpec {
    /// Unconditional delete of every row in a state table.
    pub fn all(table: StateTable) -> Self {
        Self {
            table: table.name(),
            predicate: None,
        }
    }

    /// Delete history rows whose ledger sequence is strictly greater than `cutoff`.
    pub fn newer_than(table: HistoryTable, cutoff: u32) -> Self {
        Self {
            table: table.name(),
            predicate: Some(Predicate {
                column: table.sequence_column(),
                value: i64::from(cutoff),
            }),
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn predicate(&self) -> Option<Predicate> {
        self.predicate
    }

    /// The value to bind to the single placeholder, if there is one.
    pub fn bind_value(&self) -> Option<i64> {
        self.predicate.map(|p| p.value)
    }

    /// Render the statement; the predicate value is left as a bind parameter.
    pub fn to_sql(&self, placeholder: Placeholder) -> String {
        match self.predicate {
            None => format!("DELETE FROM {}", self.table),
            Some(p) => {
                let param = match placeholder {
                    Placeholder::Question => "?",
                    Placeholder::Numbered => "$1",
                };
                format!("DELETE FROM {} WHERE {} > {param}", self.table, p.column)
            }
        }
    }
}

// ─── Executor traits ──────────────────────────────────────────────────────────

/// Result of an executed delete.
pub trait ExecOutcome: Send {
    /// Number of rows the store reports as deleted.
    fn rows_affected(&self) -> Result<i64, ResetError>;
}

/// Something that can run a [`DeleteSpec`] against a relational store.
#[async_trait]
pub trait DeleteExecutor: Send + Sync {
    type Outcome: ExecOutcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<Self::Outcome, ResetError>;
}

/// An open store transaction. Dropping it without [`commit`](Self::commit)
/// discards every delete it executed.
#[async_trait]
pub trait StoreTransaction: DeleteExecutor + Sized {
    async fn commit(self) -> Result<(), ResetError>;
}

/// A store that can group several deletes into one atomic transaction.
#[async_trait]
pub trait AtomicScope: Send + Sync {
    type Tx: StoreTransaction;

    async fn begin(&self) -> Result<Self::Tx, ResetError>;
}

#[async_trait]
impl<T: DeleteExecutor> DeleteExecutor for &T {
    type Outcome = T::Outcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<Self::Outcome, ResetError> {
        (**self).exec(spec).await
    }
}

#[async_trait]
impl<T: DeleteExecutor> DeleteExecutor for Arc<T> {
    type Outcome = T::Outcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<Self::Outcome, ResetError> {
        (**self).exec(spec).await
    }
}

#[async_trait]
impl<T: AtomicScope> AtomicScope for &T {
    type Tx = T::Tx;

    async fn begin(&self) -> Result<Self::Tx, ResetError> {
        (**self).begin().await
    }
}

#[async_trait]
impl<T: AtomicScope> AtomicScope for Arc<T> {
    type Tx = T::Tx;

    async fn begin(&self) -> Result<Self::Tx, ResetError> {
        (**self).begin().await
    }
}

/// Execute `spec` and return the affected row count, honouring an optional
/// per-statement deadline.
pub(crate) async fn delete_counted<E: DeleteExecutor>(
    executor: &E,
    spec: &DeleteSpec,
    timeout: Option<Duration>,
) -> Result<i64, ResetError> {
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, executor.exec(spec))
            .await
            .map_err(|_| ResetError::Timeout {
                table: spec.table().to_string(),
                after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })??,
        None => executor.exec(spec).await?,
    };
    let rows = outcome.rows_affected()?;
    debug!(table = spec.table(), rows, "delete executed");
    Ok(rows)
}

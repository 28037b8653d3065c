//! History rollback: drops history rows recorded after a cutoff ledger.
//!
//! Ledgers are deleted before transactions, because a transaction belongs to
//! its ledger. If the ledger delete succeeds and the transaction delete fails,
//! the returned [`RollbackError`] still carries the ledger count. Retrying is
//! safe: the ledger delete then matches zero rows and the transaction delete
//! removes whatever is left.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::delete::{delete_counted, AtomicScope, DeleteExecutor, DeleteSpec, StoreTransaction};
use crate::error::{ResetError, RollbackError};
use crate::tables::HistoryTable;

/// Rows removed from each history table by a rollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalSummary {
    pub ledgers_removed: i64,
    pub transactions_removed: i64,
}

impl RemovalSummary {
    pub fn total(&self) -> i64 {
        self.ledgers_removed + self.transactions_removed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Removes history rows newer than a given ledger sequence.
pub struct HistoryRollback<S> {
    store: S,
    statement_timeout: Option<Duration>,
}

impl<S> HistoryRollback<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            statement_timeout: None,
        }
    }

    /// Abort any single delete that runs longer than `timeout`.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: DeleteExecutor> HistoryRollback<S> {
    /// Delete every ledger with `sequence > cutoff` and every transaction
    /// with `ledger_sequence > cutoff`, as two separate statements.
    pub async fn rollback(&self, cutoff: u32) -> Result<RemovalSummary, RollbackError> {
        remove_newer_than(&self.store, cutoff, self.statement_timeout).await
    }
}

impl<S: AtomicScope> HistoryRollback<S> {
    /// Like [`rollback`](Self::rollback), but both deletes run in one
    /// transaction. On failure nothing is removed, so the partial summary in
    /// the error is always zero.
    pub async fn rollback_atomic(&self, cutoff: u32) -> Result<RemovalSummary, RollbackError> {
        let tx = self
            .store
            .begin()
            .await
            .map_err(|e| RollbackError::new(RemovalSummary::default(), e))?;

        let summary = remove_newer_than(&tx, cutoff, self.statement_timeout)
            .await
            .map_err(|e| RollbackError::new(RemovalSummary::default(), e.into_inner()))?;

        tx.commit()
            .await
            .map_err(|e| RollbackError::new(RemovalSummary::default(), e))?;
        Ok(summary)
    }
}

async fn remove_newer_than<E: DeleteExecutor>(
    executor: &E,
    cutoff: u32,
    timeout: Option<Duration>,
) -> Result<RemovalSummary, RollbackError> {
    let mut summary = RemovalSummary::default();

    summary.ledgers_removed = delete_step(executor, HistoryTable::Ledgers, cutoff, timeout)
        .await
        .map_err(move |e| RollbackError::new(summary, e))?;

    summary.transactions_removed =
        delete_step(executor, HistoryTable::Transactions, cutoff, timeout)
            .await
            .map_err(move |e| RollbackError::new(summary, e))?;

    debug!(
        cutoff,
        ledgers = summary.ledgers_removed,
        transactions = summary.transactions_removed,
        "history rolled back"
    );
    Ok(summary)
}

async fn delete_step<E: DeleteExecutor>(
    executor: &E,
    table: HistoryTable,
    cutoff: u32,
    timeout: Option<Duration>,
) -> Result<i64, ResetError> {
    delete_counted(executor, &DeleteSpec::newer_than(table, cutoff), timeout).await
}

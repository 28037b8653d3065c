//! State truncation: empties every state table before a snapshot re-ingest.
//!
//! Tables are cleared one after another in [`StateTable::ALL`] order. The
//! first failure is returned immediately and the remaining tables are left
//! as they were, so after an error the state set must be treated as unusable
//! until a later truncation succeeds.

use std::time::Duration;

use tracing::debug;

use crate::delete::{delete_counted, AtomicScope, DeleteExecutor, DeleteSpec, StoreTransaction};
use crate::error::ResetError;
use crate::tables::StateTable;

/// Clears the derived current-state tables.
pub struct StateTruncator<S> {
    store: S,
    statement_timeout: Option<Duration>,
}

impl<S> StateTruncator<S> {
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

impl<S: DeleteExecutor> StateTruncator<S> {
    /// Delete every row from every state table, one statement per table.
    pub async fn truncate(&self) -> Result<(), ResetError> {
        truncate_all(&self.store, self.statement_timeout).await
    }
}

impl<S: AtomicScope> StateTruncator<S> {
    /// Like [`truncate`](Self::truncate), but inside a single transaction:
    /// either every table is emptied or none is.
    pub async fn truncate_atomic(&self) -> Result<(), ResetError> {
        let tx = self.store.begin().await?;
        truncate_all(&tx, self.statement_timeout).await?;
        tx.commit().await
    }
}

async fn truncate_all<E: DeleteExecutor>(
    executor: &E,
    timeout: Option<Duration>,
) -> Result<(), ResetError> {
    let mut removed = 0i64;
    for table in StateTable::ALL {
        removed += delete_counted(executor, &DeleteSpec::all(table), timeout).await?;
    }
    debug!(tables = StateTable::ALL.len(), rows = removed, "state tables truncated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedStore;

    #[tokio::test]
    async fn deletes_each_state_table_once() {
        let store = ScriptedStore::new().rows("accounts", 10).rows("offers", 3);
        let truncator = StateTruncator::new(store.clone());
        truncator.truncate().await.unwrap();

        let expected: Vec<String> = StateTable::ALL
            .iter()
            .map(|t| format!("delete {}", t.name()))
            .collect();
        assert_eq!(store.log(), expected);
    }

    #[tokio::test]
    async fn empty_tables_are_a_noop_success() {
        let truncator = StateTruncator::new(ScriptedStore::new());
        assert!(truncator.truncate().await.is_ok());
    }

    #[tokio::test]
    async fn stops_at_first_failing_table() {
        let store = ScriptedStore::new().fail_exec("accounts_signers");
        let truncator = StateTruncator::new(store.clone());

        let err = truncator.truncate().await.unwrap_err();
        assert_eq!(err.table(), Some("accounts_signers"));
        // offers and trust_lines were never attempted
        assert_eq!(
            store.log(),
            vec![
                "delete accounts",
                "delete accounts_data",
                "delete accounts_signers"
            ]
        );
    }

    #[tokio::test]
    async fn row_count_failure_is_surfaced() {
        let store = ScriptedStore::new().fail_count("exp_asset_stats");
        let err = StateTruncator::new(store).truncate().await.unwrap_err();
        assert!(matches!(err, ResetError::RowsAffected { .. }));
    }

    #[tokio::test]
    async fn atomic_truncate_commits_after_all_tables() {
        let store = ScriptedStore::new();
        StateTruncator::new(&store).truncate_atomic().await.unwrap();

        let log = store.log();
        assert_eq!(log.first().map(String::as_str), Some("begin"));
        assert_eq!(log.last().map(String::as_str), Some("commit"));
        assert_eq!(log.len(), StateTable::ALL.len() + 2);
    }

    #[tokio::test]
    async fn atomic_truncate_does_not_commit_on_failure() {
        let store = ScriptedStore::new().fail_exec("offers");
        assert!(StateTruncator::new(&store).truncate_atomic().await.is_err());
        assert!(!store.log().iter().any(|e| e == "commit"));
    }

    #[tokio::test]
    async fn statement_timeout_aborts_the_first_slow_delete() {
        let store = ScriptedStore::new().delay(Duration::from_millis(200));
        let truncator =
            StateTruncator::new(store.clone()).with_statement_timeout(Duration::from_millis(10));

        let err = truncator.truncate().await.unwrap_err();
        assert!(matches!(err, ResetError::Timeout { after_ms: 10, .. }));
        assert_eq!(err.table(), Some("accounts"));
        // the slow delete never completed, so nothing was recorded
        assert!(truncator.store().log().is_empty());
    }
}

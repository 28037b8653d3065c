//! In-memory storage backend.
//!
//! Keeps named tables of integer-column rows in RAM. Useful for tests, dry
//! runs, and exercising failure paths: a table can be told to fail its next
//! deletes, or to fail reporting the affected row count.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use ledgerreset_core::delete::{
    AtomicScope, DeleteExecutor, DeleteSpec, ExecOutcome, StoreTransaction,
};
use ledgerreset_core::error::ResetError;
use ledgerreset_core::tables::{HistoryTable, StateTable};

/// A single row: column name → integer value.
pub type Row = BTreeMap<String, i64>;

#[derive(Clone, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    exec_failures: HashSet<String>,
    count_failures: HashSet<String>,
}

impl Tables {
    fn delete(&mut self, spec: &DeleteSpec) -> Result<MemoryOutcome, ResetError> {
        let table = spec.table();
        if self.exec_failures.contains(table) {
            return Err(ResetError::Exec {
                table: table.to_string(),
                reason: "injected failure".into(),
            });
        }
        let rows = self.rows.get_mut(table).ok_or_else(|| ResetError::Exec {
            table: table.to_string(),
            reason: format!("no such table: {table}"),
        })?;

        Ok(MemoryOutcome {
            table,
            rows: remove_matching(rows, spec),
            fail: self.count_failures.contains(table),
        })
    }
}

/// Drop every row `spec` selects; returns how many were removed.
fn remove_matching(rows: &mut Vec<Row>, spec: &DeleteSpec) -> usize {
    let before = rows.len();
    match spec.predicate() {
        None => rows.clear(),
        Some(p) => rows.retain(|row| !matches!(row.get(p.column), Some(v) if *v > p.value)),
    }
    before - rows.len()
}

fn lock(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory table store.
///
/// Cheap to clone; clones share the same tables. All data is lost when the
/// last clone is dropped.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store with every state and history table created, all empty.
    pub fn with_ingestion_schema() -> Self {
        let store = Self::new();
        for table in StateTable::ALL {
            store.create_table(table.name());
        }
        for table in HistoryTable::ALL {
            store.create_table(table.name());
        }
        store
    }

    /// Create an empty table (no-op if it already exists).
    pub fn create_table(&self, table: &str) {
        lock(&self.inner).rows.entry(table.to_string()).or_default();
    }

    /// Append a row, creating the table if needed.
    pub fn insert_row(&self, table: &str, columns: &[(&str, i64)]) {
        let row: Row = columns.iter().map(|(c, v)| (c.to_string(), *v)).collect();
        lock(&self.inner)
            .rows
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Record a closed ledger and `tx_count` transactions belonging to it.
    pub fn insert_ledger(&self, sequence: u32, tx_count: u32) {
        let seq = i64::from(sequence);
        self.insert_row(HistoryTable::Ledgers.name(), &[("sequence", seq)]);
        for i in 0..tx_count {
            self.insert_row(
                HistoryTable::Transactions.name(),
                &[("ledger_sequence", seq), ("application_order", i64::from(i))],
            );
        }
    }

    pub fn row_count(&self, table: &str) -> usize {
        lock(&self.inner).rows.get(table).map_or(0, Vec::len)
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.inner).rows.get(table).cloned().unwrap_or_default()
    }

    /// Values of one column across a table, in insertion order.
    pub fn column_values(&self, table: &str, column: &str) -> Vec<i64> {
        lock(&self.inner)
            .rows
            .get(table)
            .map(|rows| rows.iter().filter_map(|r| r.get(column).copied()).collect())
            .unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = lock(&self.inner).rows.keys().cloned().collect();
        names.sort();
        names
    }

    /// Make every subsequent delete against `table` fail.
    pub fn fail_exec_on(&self, table: &str) {
        lock(&self.inner).exec_failures.insert(table.to_string());
    }

    /// Deletes against `table` still run, but reporting the row count fails.
    pub fn fail_rows_affected_on(&self, table: &str) {
        lock(&self.inner).count_failures.insert(table.to_string());
    }

    pub fn clear_failures(&self) {
        let mut tables = lock(&self.inner);
        tables.exec_failures.clear();
        tables.count_failures.clear();
    }
}

/// Outcome of a delete against the in-memory store.
pub struct MemoryOutcome {
    table: &'static str,
    rows: usize,
    fail: bool,
}

impl ExecOutcome for MemoryOutcome {
    fn rows_affected(&self) -> Result<i64, ResetError> {
        if self.fail {
            return Err(ResetError::RowsAffected {
                table: self.table.to_string(),
                reason: "injected failure".into(),
            });
        }
        i64::try_from(self.rows).map_err(|e| ResetError::RowsAffected {
            table: self.table.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl DeleteExecutor for InMemoryStore {
    type Outcome = MemoryOutcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<MemoryOutcome, ResetError> {
        lock(&self.inner).delete(spec)
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

struct TxState {
    working: Tables,
    applied: Vec<DeleteSpec>,
}

/// Copy-on-begin transaction: deletes run against a private copy of the
/// tables and are logged. Commit replays the logged deletes on the shared
/// tables under a single lock, so rows written through the store while the
/// transaction was open survive unless a replayed delete selects them.
pub struct MemoryTx {
    origin: Arc<Mutex<Tables>>,
    state: Mutex<TxState>,
}

#[async_trait]
impl DeleteExecutor for MemoryTx {
    type Outcome = MemoryOutcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<MemoryOutcome, ResetError> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let outcome = state.working.delete(spec)?;
        state.applied.push(*spec);
        Ok(outcome)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTx {
    async fn commit(self) -> Result<(), ResetError> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut origin = lock(&self.origin);
        for spec in &state.applied {
            if let Some(rows) = origin.rows.get_mut(spec.table()) {
                remove_matching(rows, spec);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AtomicScope for InMemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, ResetError> {
        let snapshot = lock(&self.inner).clone();
        Ok(MemoryTx {
            origin: Arc::clone(&self.inner),
            state: Mutex::new(TxState {
                working: snapshot,
                applied: Vec::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerreset_core::{HistoryRollback, StateTruncator};

    #[tokio::test]
    async fn predicate_delete_counts_matching_rows() {
        let store = InMemoryStore::new();
        for seq in 100..=105 {
            store.insert_ledger(seq, 2);
        }

        let spec = DeleteSpec::newer_than(HistoryTable::Transactions, 102);
        let out = store.exec(&spec).await.unwrap();
        assert_eq!(out.rows_affected().unwrap(), 6);
        assert_eq!(store.row_count("exp_history_transactions"), 6);
        assert_eq!(store.row_count("exp_history_ledgers"), 6);
    }

    #[tokio::test]
    async fn missing_table_is_an_exec_error() {
        let store = InMemoryStore::new();
        let err = store
            .exec(&DeleteSpec::all(StateTable::Offers))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ResetError::Exec { .. }));
    }

    #[tokio::test]
    async fn injected_count_failure_still_deletes() {
        let store = InMemoryStore::with_ingestion_schema();
        store.insert_row("offers", &[("offer_id", 1)]);
        store.fail_rows_affected_on("offers");

        let out = store.exec(&DeleteSpec::all(StateTable::Offers)).await.unwrap();
        assert!(out.rows_affected().is_err());
        assert_eq!(store.row_count("offers"), 0);
    }

    #[tokio::test]
    async fn uncommitted_transaction_changes_nothing() {
        let store = InMemoryStore::with_ingestion_schema();
        store.insert_ledger(7, 1);

        let tx = store.begin().await.unwrap();
        tx.exec(&DeleteSpec::newer_than(HistoryTable::Ledgers, 0))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(store.row_count("exp_history_ledgers"), 1);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = InMemoryStore::with_ingestion_schema();
        store.insert_ledger(7, 1);

        let tx = store.begin().await.unwrap();
        tx.exec(&DeleteSpec::newer_than(HistoryTable::Ledgers, 0))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.row_count("exp_history_ledgers"), 0);
        assert_eq!(store.row_count("exp_history_transactions"), 1);
    }

    #[tokio::test]
    async fn commit_keeps_rows_written_while_transaction_was_open() {
        let store = InMemoryStore::with_ingestion_schema();
        store.insert_row("key_value_store", &[("last_ledger", 102)]);
        for seq in 100..=102 {
            store.insert_ledger(seq, 1);
        }

        let tx = store.begin().await.unwrap();
        let out = tx
            .exec(&DeleteSpec::newer_than(HistoryTable::Ledgers, 100))
            .await
            .unwrap();
        assert_eq!(out.rows_affected().unwrap(), 2);

        // ingestion keeps writing through the shared handle
        store.insert_row("key_value_store", &[("last_ledger", 103)]);
        store.insert_row("accounts", &[("balance", 5)]);
        store.insert_row("exp_history_ledgers", &[("sequence", 99)]);

        tx.commit().await.unwrap();

        assert_eq!(store.row_count("key_value_store"), 2);
        assert_eq!(store.row_count("accounts"), 1);
        assert_eq!(store.column_values("exp_history_ledgers", "sequence"), vec![100, 99]);
        assert_eq!(store.row_count("exp_history_transactions"), 3);
    }

    #[tokio::test]
    async fn atomic_truncate_leaves_tables_outside_the_state_set() {
        let store = InMemoryStore::with_ingestion_schema();
        store.insert_row("key_value_store", &[("last_ledger", 7)]);
        store.insert_row("trust_lines", &[("balance", 1)]);

        let truncator = StateTruncator::new(store.clone());
        truncator.truncate_atomic().await.unwrap();

        assert_eq!(truncator.store().row_count("trust_lines"), 0);
        assert_eq!(store.row_count("key_value_store"), 1);
        let mut expected: Vec<String> =
            StateTable::ALL.iter().map(|t| t.name().to_string()).collect();
        expected.extend(HistoryTable::ALL.iter().map(|t| t.name().to_string()));
        expected.push("key_value_store".into());
        expected.sort();
        assert_eq!(store.table_names(), expected);
    }

    #[tokio::test]
    async fn truncate_then_rollback_on_shared_clone() {
        let store = InMemoryStore::with_ingestion_schema();
        store.insert_row("accounts", &[("balance", 10)]);
        store.insert_ledger(1, 1);
        store.insert_ledger(2, 1);

        StateTruncator::new(store.clone()).truncate().await.unwrap();
        let summary = HistoryRollback::new(store.clone()).rollback(1).await.unwrap();

        assert_eq!(store.row_count("accounts"), 0);
        assert_eq!(summary.ledgers_removed, 1);
        assert_eq!(store.column_values("exp_history_ledgers", "sequence"), vec![1]);
    }
}

//! Scripted executor for unit tests: canned row counts, injected failures,
//! and a shared log of every call.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::delete::{AtomicScope, DeleteExecutor, DeleteSpec, ExecOutcome, StoreTransaction};
use crate::error::ResetError;

#[derive(Clone, Default)]
pub(crate) struct ScriptedStore {
    rows: HashMap<&'static str, i64>,
    exec_failures: HashSet<&'static str>,
    count_failures: HashSet<&'static str>,
    delay: Option<Duration>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rows(mut self, table: &'static str, n: i64) -> Self {
        self.rows.insert(table, n);
        self
    }

    pub(crate) fn fail_exec(mut self, table: &'static str) -> Self {
        self.exec_failures.insert(table);
        self
    }

    pub(crate) fn fail_count(mut self, table: &'static str) -> Self {
        self.count_failures.insert(table);
        self
    }

    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

pub(crate) struct ScriptedOutcome {
    table: &'static str,
    rows: i64,
    fail: bool,
}

impl ExecOutcome for ScriptedOutcome {
    fn rows_affected(&self) -> Result<i64, ResetError> {
        if self.fail {
            return Err(ResetError::RowsAffected {
                table: self.table.to_string(),
                reason: "driver does not report row counts".into(),
            });
        }
        Ok(self.rows)
    }
}

#[async_trait]
impl DeleteExecutor for ScriptedStore {
    type Outcome = ScriptedOutcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<ScriptedOutcome, ResetError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.record(format!("delete {}", spec.table()));
        if self.exec_failures.contains(spec.table()) {
            return Err(ResetError::Exec {
                table: spec.table().to_string(),
                reason: "connection reset by peer".into(),
            });
        }
        Ok(ScriptedOutcome {
            table: spec.table(),
            rows: self.rows.get(spec.table()).copied().unwrap_or(0),
            fail: self.count_failures.contains(spec.table()),
        })
    }
}

pub(crate) struct ScriptedTx(ScriptedStore);

#[async_trait]
impl DeleteExecutor for ScriptedTx {
    type Outcome = ScriptedOutcome;

    async fn exec(&self, spec: &DeleteSpec) -> Result<ScriptedOutcome, ResetError> {
        self.0.exec(spec).await
    }
}

#[async_trait]
impl StoreTransaction for ScriptedTx {
    async fn commit(self) -> Result<(), ResetError> {
        self.0.record("commit".into());
        Ok(())
    }
}

#[async_trait]
impl AtomicScope for ScriptedStore {
    type Tx = ScriptedTx;

    async fn begin(&self) -> Result<ScriptedTx, ResetError> {
        self.record("begin".into());
        Ok(ScriptedTx(self.clone()))
    }
}

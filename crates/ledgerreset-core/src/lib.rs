//! ledgerreset-core: discard derived ingestion data so ingestion can restart.
//!
//! # Architecture
//!
//! ```text
//! caller (CLI / ingestion control loop)
//!     ├── StateTruncator   (empties every state table)
//!     └── HistoryRollback  (drops history rows newer than a cutoff ledger)
//!              │
//!              └── DeleteExecutor (memory / SQLite / Postgres backend)
//! ```

pub mod config;
pub mod delete;
pub mod error;
pub mod rollback;
pub mod tables;
pub mod truncate;

#[cfg(test)]
mod testing;

pub use config::{Backend, LogConfig, PoolConfig, ResetConfig};
pub use delete::{
    AtomicScope, DeleteExecutor, DeleteSpec, ExecOutcome, Placeholder, Predicate, StoreTransaction,
};
pub use error::{ResetError, RollbackError};
pub use rollback::{HistoryRollback, RemovalSummary};
pub use tables::{HistoryTable, StateTable};
pub use truncate::StateTruncator;

//! Error types for reset operations.

use thiserror::Error;

use crate::rollback::RemovalSummary;

/// Errors that can occur while truncating or rolling back ingestion tables.
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("delete from '{table}' failed: {reason}")]
    Exec { table: String, reason: String },

    #[error("could not read rows affected for '{table}': {reason}")]
    RowsAffected { table: String, reason: String },

    #[error("delete from '{table}' timed out after {after_ms}ms")]
    Timeout { table: String, after_ms: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl ResetError {
    /// The table whose delete failed, if the error is tied to one.
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Exec { table, .. }
            | Self::RowsAffected { table, .. }
            | Self::Timeout { table, .. } => Some(table),
            Self::Storage(_) | Self::Config(_) => None,
        }
    }

    /// Returns `true` if a per-statement deadline expired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A failed history rollback, together with whatever was removed before it failed.
///
/// With the non-atomic rollback, `partial.ledgers_removed` can be non-zero
/// while `partial.transactions_removed` is zero: the ledger rows are gone and
/// the transaction delete never completed.
#[derive(Debug, Error)]
#[error("history rollback failed after removing {} ledgers and {} transactions: {source}", .partial.ledgers_removed, .partial.transactions_removed)]
pub struct RollbackError {
    pub partial: RemovalSummary,
    #[source]
    pub source: ResetError,
}

impl RollbackError {
    pub fn new(partial: RemovalSummary, source: ResetError) -> Self {
        Self { partial, source }
    }

    /// Consume the error, keeping only the underlying store failure.
    pub fn into_inner(self) -> ResetError {
        self.source
    }
}

//! The fixed table sets touched by reset operations.
//!
//! Both sets are closed enums so that no table name can ever come from
//! caller input.

use serde::{Deserialize, Serialize};

// ─── StateTable ───────────────────────────────────────────────────────────────

/// Tables holding the current value of ledger objects, rebuilt from snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateTable {
    Accounts,
    AccountsData,
    AccountsSigners,
    AssetStats,
    Offers,
    TrustLines,
}

impl StateTable {
    /// Every state table, in truncation order.
    pub const ALL: [StateTable; 6] = [
        Self::Accounts,
        Self::AccountsData,
        Self::AccountsSigners,
        Self::AssetStats,
        Self::Offers,
        Self::TrustLines,
    ];

    /// Table name in the database.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::AccountsData => "accounts_data",
            Self::AccountsSigners => "accounts_signers",
            Self::AssetStats => "exp_asset_stats",
            Self::Offers => "offers",
            Self::TrustLines => "trust_lines",
        }
    }
}

impl std::fmt::Display for StateTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── HistoryTable ─────────────────────────────────────────────────────────────

/// Append-only tables keyed by ledger sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryTable {
    Ledgers,
    Transactions,
}

impl HistoryTable {
    /// Every history table, in rollback order (owner before owned).
    pub const ALL: [HistoryTable; 2] = [Self::Ledgers, Self::Transactions];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ledgers => "exp_history_ledgers",
            Self::Transactions => "exp_history_transactions",
        }
    }

    /// Column holding the ledger sequence a row belongs to.
    pub const fn sequence_column(self) -> &'static str {
        match self {
            Self::Ledgers => "sequence",
            Self::Transactions => "ledger_sequence",
        }
    }
}

impl std::fmt::Display for HistoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

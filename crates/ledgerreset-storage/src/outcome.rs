//! Row-count outcome shared by the `sqlx` backends.

use ledgerreset_core::error::ResetError;
use ledgerreset_core::ExecOutcome;

/// Rows affected as reported by the driver, tagged with the table for errors.
pub struct SqlOutcome {
    pub(crate) table: &'static str,
    pub(crate) rows: u64,
}

impl ExecOutcome for SqlOutcome {
    fn rows_affected(&self) -> Result<i64, ResetError> {
        i64::try_from(self.rows).map_err(|_| ResetError::RowsAffected {
            table: self.table.to_string(),
            reason: format!("row count {} does not fit in i64", self.rows),
        })
    }
}

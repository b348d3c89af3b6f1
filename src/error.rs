//! Error kinds produced by the indexed table (see `§7 ERROR HANDLING DESIGN`).
//!
//! `IndexUpdateFailed` is recoverable by the cache layer once `doUpdate` has fully rolled back.
//! `InvariantViolation` indicates a bug in the update protocol itself and is never expected from a
//! correct caller; it exists so that assertion failures during rollback surface as a typed error
//! instead of a panic that would poison the table's lock.

use std::fmt;

use crate::row::RowKey;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TableError>;

/// Errors surfaced by [`crate::table::Table`] operations.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// A unique-constraint violation occurred while inserting or replacing a row; by the time
    /// this error reaches the caller, every index touched by the failed update has already been
    /// rolled back to its pre-call state.
    #[error("unique constraint violated on index {index} for key {key}")]
    IndexUpdateFailed {
        /// Name of the index that rejected the row.
        index: String,
        /// The key of the row that could not be inserted.
        key: RowKey,
    },

    /// The calling thread was interrupted while waiting to acquire the table's write lock during
    /// snapshot installation.
    #[error("interrupted while waiting for the table write lock")]
    Interrupted,

    /// A DDL operation was attempted against this table, which only accepts updates from the
    /// cache's put/remove path.
    #[error("unsupported DDL operation: {0}")]
    UnsupportedDdl(&'static str),

    /// An internal invariant of the update protocol was violated. Always a bug.
    #[error("index invariant violated: {0}")]
    InvariantViolation(String),
}

impl TableError {
    /// Construct an [`TableError::InvariantViolation`] from a `format!`-style message.
    pub fn invariant(msg: impl fmt::Display) -> Self {
        TableError::InvariantViolation(msg.to_string())
    }
}

/// Asserts `$cond`, returning `Err(TableError::InvariantViolation(..))` instead of panicking when
/// it does not hold. Used at the rollback assertion points `doUpdate` names explicitly (equal
/// displaced rows, primary-compare equality after removal from a secondary index, etc), so a bug
/// in the update protocol surfaces as a typed error to the cache layer rather than unwinding
/// through a held lock.
macro_rules! invariant {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::error::TableError::invariant(format!($($msg)*)));
        }
    };
}

pub(crate) use invariant;

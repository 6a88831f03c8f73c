// crates/securetrack-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: Error taxonomy for the SQLite device store.
// Purpose: Classify engine failures and map them onto the core StoreError.
// Dependencies: rusqlite, securetrack-core, thiserror
// ============================================================================

//! ## Overview
//! Engine errors are classified once, at the `rusqlite` boundary: constraint
//! failures become [`SqliteStoreError::ConstraintViolation`], file-level
//! failures become [`SqliteStoreError::Io`], everything else is
//! [`SqliteStoreError::Db`].

use rusqlite::ErrorCode;
use securetrack_core::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding full record payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// On-disk table shape disagrees with the registry.
    #[error("sqlite store schema validation failed for {table}:\n{diff}")]
    SchemaValidation {
        /// Table whose shape disagrees.
        table: String,
        /// Expected/found description.
        diff: String,
    },
    /// Write rejected by a table constraint.
    #[error("sqlite store constraint violation: {0}")]
    ConstraintViolation(String),
    /// Stored value could not be decoded.
    #[error("sqlite store decode error in {table}.{column}: {value:?}")]
    Decode {
        /// Source table.
        table: String,
        /// Source column.
        column: String,
        /// Offending stored value.
        value: String,
    },
    /// No registered migration covers the version gap.
    #[error("sqlite store has no migration from version {from} to {to}")]
    MigrationMissing {
        /// Version found on disk.
        from: i64,
        /// Version expected by the registry.
        to: i64,
    },
    /// Invalid configuration or input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Blocking call rejected because it ran on an async worker.
    #[error("sqlite store blocking call from async context: {0}")]
    BlockingContext(String),
    /// Store or subscription has shut down.
    #[error("sqlite store closed: {0}")]
    Closed(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => Self::ConstraintViolation(error.to_string()),
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
                | ErrorCode::PermissionDenied
                | ErrorCode::NotADatabase,
            ) => Self::Io(error.to_string()),
            _ => Self::Db(error.to_string()),
        }
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::SchemaValidation {
                table,
                diff,
            } => Self::SchemaValidation {
                table,
                diff,
            },
            SqliteStoreError::ConstraintViolation(message) => Self::ConstraintViolation(message),
            SqliteStoreError::Decode {
                table,
                column,
                value,
            } => Self::Decode {
                table,
                column,
                value,
            },
            SqliteStoreError::MigrationMissing {
                from,
                to,
            } => Self::MigrationMissing {
                from,
                to,
            },
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::BlockingContext(message) => Self::BlockingContext(message),
            SqliteStoreError::Closed(message) => Self::Closed(message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use rusqlite::Connection;

    use super::SqliteStoreError;

    #[test]
    fn unique_failure_classifies_as_constraint_violation() {
        let connection = Connection::open_in_memory().unwrap();
        connection.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);").unwrap();
        connection.execute("INSERT INTO t (id) VALUES (1)", []).unwrap();
        let err = connection.execute("INSERT INTO t (id) VALUES (1)", []).unwrap_err();
        assert!(matches!(SqliteStoreError::from(err), SqliteStoreError::ConstraintViolation(_)));
    }

    #[test]
    fn syntax_failure_classifies_as_db() {
        let connection = Connection::open_in_memory().unwrap();
        let err = connection.execute_batch("NOT SQL").unwrap_err();
        assert!(matches!(SqliteStoreError::from(err), SqliteStoreError::Db(_)));
    }
}

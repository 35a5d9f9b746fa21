//! # Error Handling for litebridge
//!
//! This module defines the error types used throughout litebridge. A single
//! error enum ([`Error`]) represents every failure mode, so a batch caller can
//! match on the kind without unwrapping nested error types.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations.
//! This provides:
//! - Automatic `Display` implementation from the `#[error(...)]` attributes
//! - Automatic `From` implementations from the `#[from]` attributes
//!
//! ## Error Categories
//!
//! | Category | Variants | Raised By |
//! |----------|----------|-----------|
//! | Statement | `InvalidSql`, `BindArityOrType`, `Execution` | Statement cache / executor |
//! | Transaction | `TransactionAlreadyActive`, `NoActiveTransaction`, `CommitFailed` | Transaction controller |
//! | Payload | `MalformedBatch` | Batch decoders |
//! | Setup | `Sqlite`, `Schema` | Opening, pragmas, versioning |
//! | Query | `Query` | Result-shape checks on read paths |
//! | Lifecycle | `Closed`, `Worker` | Use after teardown, worker thread gone |
//!
//! ## Batch Propagation Policy
//!
//! Any error raised while a batch is running causes the whole batch to be
//! rolled back, and then the *same* error value is returned to the caller.
//! Nothing is retried. The only failures that are never returned are close
//! failures during teardown, which go to the diagnostics sink instead.

use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in litebridge operations.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Statement Errors
    // =========================================================================

    /// The engine refused to compile a SQL string.
    ///
    /// `message` is the engine's own diagnostic, passed through untouched so
    /// callers can surface it.
    #[error("invalid sql '{sql}': {message}")]
    InvalidSql {
        /// The SQL text that failed to compile
        sql: String,
        /// Engine diagnostic
        message: String,
    },

    /// An ArgBatch did not match the statement's placeholders.
    ///
    /// # When This Happens
    ///
    /// - The number of values differs from the statement's parameter count
    /// - A value is not a scalar (nested array or object from the host)
    #[error("bind error for '{sql}': {message}")]
    BindArityOrType {
        /// The SQL text being bound
        sql: String,
        /// What did not match
        message: String,
    },

    /// The engine rejected a step (constraint violation, type check, ...).
    #[error("execution failed for '{sql}': {message}")]
    Execution {
        /// The SQL text being executed
        sql: String,
        /// Engine diagnostic
        message: String,
    },

    // =========================================================================
    // Transaction Errors
    // =========================================================================

    /// `begin()` was called while a transaction is already active.
    ///
    /// There are no nested transactions. A second batch on the same
    /// connection must wait until the first has committed or rolled back.
    #[error("a transaction is already active on this connection")]
    TransactionAlreadyActive,

    /// `commit()` was called with no active transaction.
    #[error("no active transaction to commit")]
    NoActiveTransaction,

    /// The engine rejected `COMMIT`.
    ///
    /// The connection has been returned to a non-transactional state and
    /// none of the batch's writes are visible.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    // =========================================================================
    // Payload Errors
    // =========================================================================

    /// The batch payload does not have the `[opType, table, sql, argBatches]`
    /// shape, or the serialized form could not be parsed.
    #[error("malformed batch: {0}")]
    MalformedBatch(String),

    // =========================================================================
    // Setup / Internal Errors
    // =========================================================================

    /// SQLite operation failed outside of batch execution (open, pragmas,
    /// schema scripts).
    ///
    /// # Rust Pattern: #[from]
    ///
    /// The `#[from]` attribute lets `?` convert `rusqlite::Error` directly.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema version mismatch, or a migration precondition failed.
    #[error("schema error: {0}")]
    Schema(String),

    /// A query returned rows in a shape the read path does not accept
    /// (for example a missing `id` column).
    #[error("query error: {0}")]
    Query(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================

    /// The database has been closed.
    #[error("database is closed")]
    Closed,

    /// The worker thread owning the database is no longer running.
    #[error("worker error: {0}")]
    Worker(String),
}

impl Error {
    /// Returns true for errors that are raised from inside a running batch
    /// and therefore always come with a rollback.
    pub fn is_batch_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidSql { .. }
                | Error::BindArityOrType { .. }
                | Error::Execution { .. }
                | Error::MalformedBatch(_)
                | Error::CommitFailed(_)
        )
    }
}

/// Extracts the engine's diagnostic text from a rusqlite error.
///
/// `SqliteFailure` carries the message from `sqlite3_errmsg`; fall back to the
/// error's display form when it is absent.
pub(crate) fn engine_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(code, Some(msg)) => {
            format!("{msg} (code {})", code.extended_code)
        }
        other => other.to_string(),
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let invalid = Error::InvalidSql {
            sql: "INSERT INTO".to_string(),
            message: "incomplete input".to_string(),
        };
        assert_eq!(
            invalid.to_string(),
            "invalid sql 'INSERT INTO': incomplete input"
        );

        let bind = Error::BindArityOrType {
            sql: "INSERT INTO t(id) VALUES(?)".to_string(),
            message: "expected 1 values, got 2".to_string(),
        };
        assert_eq!(
            bind.to_string(),
            "bind error for 'INSERT INTO t(id) VALUES(?)': expected 1 values, got 2"
        );

        assert_eq!(
            Error::TransactionAlreadyActive.to_string(),
            "a transaction is already active on this connection"
        );
        assert_eq!(
            Error::CommitFailed("FOREIGN KEY constraint failed".to_string()).to_string(),
            "commit failed: FOREIGN KEY constraint failed"
        );
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let sqlite_err = rusqlite::Error::InvalidParameterName("test".to_string());

        let our_err: Error = sqlite_err.into();

        assert!(matches!(our_err, Error::Sqlite(_)));
        assert!(our_err.to_string().contains("sqlite error"));
    }

    #[test]
    fn test_batch_error_classification() {
        assert!(Error::MalformedBatch("x".into()).is_batch_error());
        assert!(Error::CommitFailed("x".into()).is_batch_error());
        assert!(!Error::Closed.is_batch_error());
        assert!(!Error::TransactionAlreadyActive.is_batch_error());
    }
}

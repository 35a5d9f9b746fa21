//! # Transaction Controller
//!
//! Tracks the single transaction a connection may have open.
//!
//! ```text
//!          begin()              commit() ok
//!   Idle ──────────► Active ─────────────────► Committed
//!    ▲                  │
//!    │                  │ rollback() / commit() failed
//!    │                  ▼
//!    └──────────── RolledBack
//! ```
//!
//! `Committed` and `RolledBack` behave like `Idle` for the next `begin()`.
//!
//! Transactions are driven with raw `BEGIN` / `COMMIT` / `ROLLBACK` SQL rather
//! than `rusqlite::Transaction`, because the batch scope needs to hold
//! prepared statements that borrow the connection while the transaction is
//! open.
//!
//! ## Transaction Scope
//!
//! While a [`TransactionScope`] is alive the connection refuses to compile
//! `BEGIN`, `COMMIT`, `END`, `ROLLBACK`, `SAVEPOINT` and `RELEASE`. Caller
//! SQL that ended the surrounding transaction would leave its earlier writes
//! committed and its later ones in autocommit mode, out of reach of the
//! final rollback. The refusal happens at compile time, before the statement
//! touches anything.

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::Connection;

use crate::config::BeginMode;
use crate::error::{engine_message, Error, Result};

/// Transaction state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
    #[default]
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// Begin/commit/rollback with re-entrancy tracking.
#[derive(Debug, Default)]
pub struct TransactionController {
    state: TxState,
    mode: BeginMode,
}

impl TransactionController {
    pub fn new(mode: BeginMode) -> Self {
        Self {
            state: TxState::Idle,
            mode,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// - `Error::TransactionAlreadyActive` if this controller is active, or the
    ///   connection is already inside a transaction started elsewhere
    /// - `Error::Sqlite` if the engine refuses `BEGIN` (busy, read-only, ...)
    pub fn begin(&mut self, conn: &Connection) -> Result<()> {
        if self.is_active() || !conn.is_autocommit() {
            return Err(Error::TransactionAlreadyActive);
        }

        conn.execute_batch(self.mode.begin_sql())?;
        self.state = TxState::Active;
        Ok(())
    }

    /// Commits the active transaction.
    ///
    /// On engine rejection the transaction is rolled back so the connection
    /// is left outside any transaction, and `Error::CommitFailed` carries the
    /// engine message.
    pub fn commit(&mut self, conn: &Connection) -> Result<()> {
        if !self.is_active() {
            return Err(Error::NoActiveTransaction);
        }

        match conn.execute_batch("COMMIT") {
            Ok(()) => {
                self.state = TxState::Committed;
                Ok(())
            }
            Err(e) => {
                if !conn.is_autocommit() {
                    // Best effort; the commit error is the one worth reporting.
                    let _ = conn.execute_batch("ROLLBACK");
                }
                self.state = TxState::RolledBack;
                Err(Error::CommitFailed(engine_message(&e)))
            }
        }
    }

    /// Rolls back the active transaction.
    ///
    /// Always leaves the controller outside a transaction. Returns the
    /// engine's error when `ROLLBACK` itself fails (for example because
    /// SQLite already rolled back on its own); callers inside a failing batch
    /// report it and keep the original error.
    pub fn rollback(&mut self, conn: &Connection) -> Result<()> {
        if self.is_active() {
            self.state = TxState::RolledBack;
        }

        if conn.is_autocommit() {
            return Ok(());
        }

        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

// =============================================================================
// Transaction Scope
// =============================================================================

/// Keeps caller SQL from changing transaction state while it runs inside a
/// controller-owned transaction.
///
/// # Rust Pattern: RAII Guard
///
/// The authorizer is installed in `enter` and removed in `Drop`, so the
/// controller's own `COMMIT` / `ROLLBACK` always run after the scope is gone,
/// on every exit path.
pub(crate) struct TransactionScope<'conn> {
    conn: &'conn Connection,
}

impl<'conn> TransactionScope<'conn> {
    pub(crate) fn enter(conn: &'conn Connection) -> Self {
        conn.authorizer(Some(deny_transaction_control));
        Self { conn }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        self.conn
            .authorizer(None::<fn(AuthContext<'_>) -> Authorization>);
    }
}

fn deny_transaction_control(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Transaction { .. } | AuthAction::Savepoint { .. } => Authorization::Deny,
        _ => Authorization::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY)").unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_begin_commit() {
        let conn = test_conn();
        let mut tx = TransactionController::new(BeginMode::Immediate);

        tx.begin(&conn).unwrap();
        assert!(tx.is_active());
        assert!(!conn.is_autocommit());

        conn.execute("INSERT INTO t VALUES ('a')", []).unwrap();
        tx.commit(&conn).unwrap();

        assert_eq!(tx.state(), TxState::Committed);
        assert!(conn.is_autocommit());
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_double_begin_rejected() {
        let conn = test_conn();
        let mut tx = TransactionController::default();

        tx.begin(&conn).unwrap();
        assert!(matches!(tx.begin(&conn), Err(Error::TransactionAlreadyActive)));
        // First transaction is untouched
        assert!(tx.is_active());
    }

    #[test]
    fn test_begin_rejected_inside_foreign_transaction() {
        let conn = test_conn();
        conn.execute_batch("BEGIN").unwrap();

        let mut tx = TransactionController::default();
        assert!(matches!(tx.begin(&conn), Err(Error::TransactionAlreadyActive)));
    }

    #[test]
    fn test_commit_without_begin() {
        let conn = test_conn();
        let mut tx = TransactionController::default();
        assert!(matches!(tx.commit(&conn), Err(Error::NoActiveTransaction)));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let conn = test_conn();
        let mut tx = TransactionController::default();

        tx.begin(&conn).unwrap();
        conn.execute("INSERT INTO t VALUES ('a')", []).unwrap();
        tx.rollback(&conn).unwrap();

        assert_eq!(tx.state(), TxState::RolledBack);
        assert_eq!(count(&conn), 0);

        // Can begin again afterwards
        tx.begin(&conn).unwrap();
        tx.commit(&conn).unwrap();
    }

    #[test]
    fn test_rollback_when_idle_is_noop() {
        let conn = test_conn();
        let mut tx = TransactionController::default();
        tx.rollback(&conn).unwrap();
        assert_eq!(tx.state(), TxState::Idle);
    }

    #[test]
    fn test_deferred_foreign_key_fails_at_commit() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id TEXT PRIMARY KEY);
             CREATE TABLE child (
                 id TEXT PRIMARY KEY,
                 parent_id TEXT REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
             );",
        )
        .unwrap();

        let mut tx = TransactionController::default();
        tx.begin(&conn).unwrap();
        conn.execute("INSERT INTO child VALUES ('c', 'missing')", [])
            .unwrap();

        let err = tx.commit(&conn).unwrap_err();
        assert!(matches!(err, Error::CommitFailed(ref m) if m.contains("FOREIGN KEY")));
        assert_eq!(tx.state(), TxState::RolledBack);
        assert!(conn.is_autocommit());

        let children: i64 = conn
            .query_row("SELECT COUNT(*) FROM child", [], |row| row.get(0))
            .unwrap();
        assert_eq!(children, 0);
    }

    #[test]
    fn test_scope_refuses_transaction_control() {
        let conn = test_conn();
        let mut tx = TransactionController::default();
        tx.begin(&conn).unwrap();

        {
            let _scope = TransactionScope::enter(&conn);
            conn.execute("INSERT INTO t VALUES ('a')", []).unwrap();
            for sql in ["COMMIT", "END", "ROLLBACK", "BEGIN", "SAVEPOINT s", "RELEASE s"] {
                assert!(conn.execute_batch(sql).is_err(), "{sql} should be refused");
            }
            assert!(!conn.is_autocommit());
        }

        tx.rollback(&conn).unwrap();
        assert_eq!(count(&conn), 0);

        // Lifted once the scope is dropped.
        conn.execute_batch("BEGIN; INSERT INTO t VALUES ('b'); COMMIT")
            .unwrap();
        assert_eq!(count(&conn), 1);
    }
}

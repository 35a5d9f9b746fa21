//! # Database Handle
//!
//! [`Database`] owns one SQLite connection and everything tied to it: the
//! transaction controller, the configuration, and the diagnostics sink.
//!
//! ## Lifecycle
//!
//! ```text
//! open / open_in_memory ──► (batch | execute | query | schema ops)* ──► close
//!                                                                        │
//!                                   every later call returns Error::Closed
//! ```
//!
//! `close` is idempotent and also runs on drop.
//!
//! ## Rust Pattern: Option<Connection> for Explicit Teardown
//!
//! `rusqlite::Connection::close` consumes the connection. Keeping it in an
//! `Option` lets `close(&mut self)` take it out with `Option::take`, leaving
//! `None` behind as the "closed" state. Every method goes through
//! [`Database::connection`], which turns `None` into `Error::Closed`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;

use crate::config::DatabaseConfig;
use crate::diagnostics::{default_sink, DiagnosticsSink};
use crate::error::{engine_message, Error, Result};
use crate::transaction::{TransactionController, TxState};

/// Path reported for in-memory databases.
pub const MEMORY_PATH: &str = ":memory:";

/// A connection to one SQLite database.
pub struct Database {
    pub(crate) conn: Option<Connection>,
    pub(crate) tx: TransactionController,
    pub(crate) config: DatabaseConfig,
    pub(crate) sink: Arc<dyn DiagnosticsSink>,
    path: String,
}

impl Database {
    /// Opens (or creates) the database file at `path` with default settings.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use litebridge::Database;
    ///
    /// let mut db = Database::open("app.db")?;
    /// db.batch_json(r#"[[0, "t", "INSERT INTO t(id) VALUES (?)", [["a"]]]]"#)?;
    /// # Ok::<(), litebridge::Error>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DatabaseConfig::default(), default_sink())
    }

    /// Opens a private in-memory database. Useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_sink(default_sink())
    }

    /// Opens an in-memory database that reports to `sink`.
    pub fn open_in_memory_with_sink(sink: Arc<dyn DiagnosticsSink>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, MEMORY_PATH.to_string(), DatabaseConfig::default(), sink)
    }

    /// Opens the database at `path` with explicit configuration and sink.
    pub fn open_with(
        path: impl AsRef<Path>,
        config: DatabaseConfig,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::from_connection(conn, path.display().to_string(), config, sink)
    }

    fn from_connection(
        conn: Connection,
        path: String,
        config: DatabaseConfig,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self> {
        conn.busy_timeout(config.busy_timeout())?;

        if config.journal_mode_wal && path != MEMORY_PATH {
            // Readers keep working while a batch is being written.
            conn.execute_batch("PRAGMA journal_mode = WAL")?;
            conn.execute_batch("PRAGMA synchronous = NORMAL")?;
        }

        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        conn.set_prepared_statement_cache_capacity(config.query_cache_capacity);

        sink.log_info(&format!("opened database {path}"));

        Ok(Self {
            conn: Some(conn),
            tx: TransactionController::new(config.begin_mode),
            config,
            sink,
            path,
        })
    }

    /// The file path this database was opened from, or `:memory:`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn transaction_state(&self) -> TxState {
        self.tx.state()
    }

    /// The live connection, or `Error::Closed`.
    pub(crate) fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::Closed)
    }

    /// Closes the connection.
    ///
    /// Safe to call more than once; later calls only log that the database
    /// is already closed. Any transaction left open is rolled back and every
    /// cached statement is finalized before the connection is closed. A close
    /// failure is logged, never returned.
    pub fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            self.sink.log_info(&format!("database {} is already closed", self.path));
            return;
        };

        if let Err(e) = self.tx.rollback(&conn) {
            self.sink
                .log_error(&format!("rollback during close failed: {e}"));
        }
        conn.flush_prepared_statement_cache();

        match conn.close() {
            Ok(()) => self.sink.log_info(&format!("closed database {}", self.path)),
            Err((conn, e)) => {
                self.sink.log_error(&format!(
                    "failed to close database {}: {}",
                    self.path,
                    engine_message(&e)
                ));
                // Dropping a connection that refused to close panics.
                std::mem::forget(conn);
            }
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.conn.is_some() {
            self.close();
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("transaction", &self.tx.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Quotes an SQL identifier, doubling embedded quotes.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

//! # Statement Cache and Executor
//!
//! Compiling SQL is the most expensive part of applying a write. A batch that
//! inserts 10,000 rows with one `INSERT` statement should compile it once and
//! execute it 10,000 times.
//!
//! ## Scope
//!
//! A [`StatementCache`] borrows the connection and lives for exactly one
//! batch:
//!
//! ```text
//! begin ─► StatementCache::new ─► compile / execute ... ─► drop cache ─► commit | rollback
//!                                                              │
//!                                                   every statement finalized
//! ```
//!
//! Because each [`CompiledStatement`] holds a `rusqlite::Statement<'conn>`,
//! the borrow checker guarantees that no statement outlives its connection,
//! and dropping the cache finalizes them on every exit path: normal return,
//! early `?` return, or panic unwinding.
//!
//! ## Reset Discipline
//!
//! [`CompiledStatement::execute`] always leaves the statement rewound with its
//! bindings cleared, whether the execution succeeded or not. Callers never
//! reset a statement themselves, so a value bound for one ArgBatch can never
//! leak into the next.

use std::num::NonZeroUsize;

use lru::LruCache;
use rusqlite::{Connection, ErrorCode, Statement};

use crate::error::{engine_message, Error, Result};
use crate::types::{ExecResult, Value};

// =============================================================================
// Compiled Statement
// =============================================================================

/// A prepared statement plus the SQL text it was compiled from.
pub struct CompiledStatement<'conn> {
    sql: String,
    stmt: Statement<'conn>,
    executions: u64,
}

impl<'conn> CompiledStatement<'conn> {
    /// The SQL text this statement was compiled from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` placeholders.
    pub fn parameter_count(&self) -> usize {
        self.stmt.parameter_count()
    }

    /// How many times this statement has been executed.
    pub fn executions(&self) -> u64 {
        self.executions
    }

    /// Binds `args`, steps once, and classifies the outcome.
    ///
    /// # Errors
    ///
    /// - `Error::BindArityOrType` if `args.len()` differs from the
    ///   placeholder count, or the engine refuses a bind
    /// - `Error::Execution` if the engine rejects the step
    pub fn execute(&mut self, args: &[Value]) -> Result<ExecResult> {
        let result = self.bind_and_step(args);

        // Rows were dropped inside bind_and_step, which rewinds the cursor.
        self.stmt.clear_bindings();

        if result.is_ok() {
            self.executions += 1;
        }
        result
    }

    fn bind_and_step(&mut self, args: &[Value]) -> Result<ExecResult> {
        bind_all(&mut self.stmt, &self.sql, args)?;

        let mut rows = self.stmt.raw_query();
        match rows.next() {
            Ok(Some(_)) => Ok(ExecResult::RowsAvailable),
            Ok(None) => Ok(ExecResult::NoRows),
            Err(e) => Err(Error::Execution {
                sql: self.sql.clone(),
                message: engine_message(&e),
            }),
        }
    }
}

impl std::fmt::Debug for CompiledStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStatement")
            .field("sql", &self.sql)
            .field("executions", &self.executions)
            .finish()
    }
}

/// Binds `args` positionally after checking arity.
///
/// Shared by the batch executor and the query paths.
pub(crate) fn bind_all(stmt: &mut Statement<'_>, sql: &str, args: &[Value]) -> Result<()> {
    let expected = stmt.parameter_count();
    if expected != args.len() {
        return Err(Error::BindArityOrType {
            sql: sql.to_string(),
            message: format!("expected {expected} values, got {}", args.len()),
        });
    }

    for (i, value) in args.iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, value)
            .map_err(|e| Error::BindArityOrType {
                sql: sql.to_string(),
                message: format!("cannot bind argument {}: {}", i + 1, engine_message(&e)),
            })?;
    }

    Ok(())
}

/// Compiles `sql` on `conn`, mapping failure to `Error::InvalidSql`.
pub(crate) fn prepare<'conn>(conn: &'conn Connection, sql: &str) -> Result<Statement<'conn>> {
    if sql.trim().is_empty() {
        return Err(Error::InvalidSql {
            sql: sql.to_string(),
            message: "empty statement".to_string(),
        });
    }

    conn.prepare(sql).map_err(|e| {
        let message = match e.sqlite_error_code() {
            Some(ErrorCode::AuthorizationForStatementDenied) => {
                "statement would end or nest the enclosing transaction".to_string()
            }
            _ => engine_message(&e),
        };
        Error::InvalidSql {
            sql: sql.to_string(),
            message,
        }
    })
}

// =============================================================================
// Statement Cache
// =============================================================================

/// Compiled statements for one batch, keyed by exact SQL text.
///
/// Bounded by an LRU: when full, the least recently used statement is
/// finalized to make room.
pub struct StatementCache<'conn> {
    conn: &'conn Connection,
    statements: LruCache<String, CompiledStatement<'conn>>,
    hits: u64,
    misses: u64,
}

impl<'conn> StatementCache<'conn> {
    /// Creates an empty cache. A capacity of 0 is treated as 1.
    pub fn new(conn: &'conn Connection, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);

        Self {
            conn,
            statements: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the compiled statement for `sql`, compiling it on first use.
    ///
    /// # Errors
    ///
    /// `Error::InvalidSql` with the engine's diagnostic if compilation fails.
    pub fn compile(&mut self, sql: &str) -> Result<&mut CompiledStatement<'conn>> {
        if self.statements.contains(sql) {
            self.hits += 1;
        } else {
            let stmt = prepare(self.conn, sql)?;
            self.misses += 1;
            self.statements.put(
                sql.to_string(),
                CompiledStatement {
                    sql: sql.to_string(),
                    stmt,
                    executions: 0,
                },
            );
        }

        self.statements.get_mut(sql).ok_or_else(|| Error::InvalidSql {
            sql: sql.to_string(),
            message: "statement missing from cache after compile".to_string(),
        })
    }

    /// Number of compile requests served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of statements actually compiled.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Number of statements currently held.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

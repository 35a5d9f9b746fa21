//! # Batch Orchestrator
//!
//! Applies a whole batch atomically: either every ArgBatch of every operation
//! takes effect, or none does.
//!
//! ## Flow
//!
//! ```text
//! run_batch(payload)
//!   │
//!   ├─ begin ─────────────── TransactionAlreadyActive? return, nothing touched
//!   │
//!   ├─ StatementCache::new(conn)
//!   ├─ decode + execute ──── structured::run  or  streamed::run
//!   ├─ drop cache ────────── all batch statements finalized
//!   │
//!   ├─ Ok  ─► commit ─────── CommitFailed? already rolled back
//!   └─ Err ─► rollback ───── return the original error
//! ```
//!
//! A batch is never partially applied. The first failing execution stops
//! the walk; later operations are not decoded, compiled, or executed.
//!
//! ## Two Decoders, One Result
//!
//! Whichever decoder runs, the same logical batch produces the same final
//! database state and the same error kind. The only observable difference is
//! how many times each statement is compiled, which [`BatchStats`] reports.

use std::fmt;
use std::io;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::de::{IoRead, StrRead};

use crate::database::Database;
use crate::error::{Error, Result};
use crate::host::{HostNode, HostValue};
use crate::statement::StatementCache;
use crate::transaction::TransactionScope;
use crate::types::Value;
use crate::{streamed, structured};

// =============================================================================
// Payloads
// =============================================================================

/// A batch in one of the two representations the host can hand over.
#[derive(Debug, Clone, Copy)]
pub enum BatchPayload<'a> {
    /// Operations already materialized as JSON values.
    Structured(&'a [serde_json::Value]),
    /// Operations as host nodes. The only form that can carry blobs.
    Nodes(&'a [HostNode]),
    /// The batch serialized as one JSON text.
    Streamed(&'a str),
}

impl BatchPayload<'_> {
    pub fn decoder_kind(&self) -> DecoderKind {
        match self {
            BatchPayload::Structured(_) | BatchPayload::Nodes(_) => DecoderKind::Structured,
            BatchPayload::Streamed(_) => DecoderKind::Streamed,
        }
    }
}

/// Which decoder applied a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    Structured,
    Streamed,
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderKind::Structured => f.write_str("structured"),
            DecoderKind::Streamed => f.write_str("streamed"),
        }
    }
}

/// Counters gathered while applying one batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Operations fully applied.
    pub operations: usize,
    /// Successful statement executions.
    pub executions: usize,
    /// Statements compiled.
    pub compiled: u64,
    /// Compile requests served from the statement cache.
    pub cache_hits: u64,
}

/// Error for an argument that is not a scalar.
pub(crate) fn unsupported_argument(sql: &str, position: usize, kind: &str) -> Error {
    Error::BindArityOrType {
        sql: sql.to_string(),
        message: format!("argument {} has unsupported type {kind}", position + 1),
    }
}

// =============================================================================
// Database Entry Points
// =============================================================================

impl Database {
    /// Applies `payload` atomically.
    ///
    /// # Errors
    ///
    /// - `Error::Closed` after [`Database::close`]
    /// - `Error::TransactionAlreadyActive` if a transaction is open on this
    ///   connection; the database is untouched
    /// - `Error::MalformedBatch`, `Error::InvalidSql`,
    ///   `Error::BindArityOrType`, `Error::Execution` from the first failing
    ///   operation; the batch is rolled back
    /// - `Error::CommitFailed` if the engine rejects the commit; the batch is
    ///   rolled back
    pub fn run_batch(&mut self, payload: BatchPayload<'_>) -> Result<BatchStats> {
        match payload {
            BatchPayload::Structured(ops) => self.batch(ops),
            BatchPayload::Nodes(ops) => self.batch(ops),
            BatchPayload::Streamed(json) => self.batch_json(json),
        }
    }

    /// Applies a structured batch of any host value type.
    pub fn batch<H: HostValue>(&mut self, operations: &[H]) -> Result<BatchStats> {
        self.apply_batch(DecoderKind::Structured, |cache, stats| {
            structured::run(cache, operations, stats)
        })
    }

    /// Applies a batch serialized as JSON text.
    pub fn batch_json(&mut self, payload: &str) -> Result<BatchStats> {
        self.apply_batch(DecoderKind::Streamed, |cache, stats| {
            streamed::run(cache, StrRead::new(payload), stats)
        })
    }

    /// Applies a batch read incrementally from `reader`.
    ///
    /// Operations execute as they are decoded, so a batch larger than memory
    /// can be applied. Wrap unbuffered readers in `io::BufReader`.
    pub fn batch_json_reader<R: io::Read>(&mut self, reader: R) -> Result<BatchStats> {
        self.apply_batch(DecoderKind::Streamed, |cache, stats| {
            streamed::run(cache, IoRead::new(reader), stats)
        })
    }

    /// Executes a single write in its own transaction and returns the number
    /// of rows it changed.
    pub fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        self.in_transaction(|conn| {
            let mut cache = StatementCache::new(conn, 1);
            cache.compile(sql)?.execute(args)?;
            Ok(conn.changes())
        })
    }

    fn apply_batch<F>(&mut self, kind: DecoderKind, decode: F) -> Result<BatchStats>
    where
        F: FnOnce(&mut StatementCache<'_>, &mut BatchStats) -> Result<()>,
    {
        let capacity = self.config.statement_cache_capacity;
        let mut stats = BatchStats::default();
        let mut started = false;

        let result = self.in_transaction(|conn| {
            started = true;
            let mut cache = StatementCache::new(conn, capacity);
            let outcome = decode(&mut cache, &mut stats);
            stats.compiled = cache.misses();
            stats.cache_hits = cache.hits();
            outcome
        });

        match &result {
            Ok(()) => self.sink.log_info(&format!(
                "{kind} batch committed: {} operations, {} executions, {} compiled, {} cache hits",
                stats.operations, stats.executions, stats.compiled, stats.cache_hits
            )),
            Err(e) if started => self
                .sink
                .log_error(&format!("{kind} batch rolled back: {e}")),
            Err(e) => self
                .sink
                .log_error(&format!("{kind} batch not started: {e}")),
        }

        result.map(|()| stats)
    }

    /// Runs `f` inside a transaction on this connection.
    ///
    /// Commits when `f` succeeds. When `f` fails the transaction is rolled
    /// back and `f`'s error is returned; a rollback failure is only logged.
    /// SQL run by `f` cannot begin, end, or nest a transaction.
    pub(crate) fn in_transaction<T>(
        &mut self,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.conn.as_ref().ok_or(Error::Closed)?;
        self.tx.begin(conn)?;

        let outcome = {
            let _scope = TransactionScope::enter(conn);
            f(conn)
        };

        match outcome {
            Ok(value) => {
                self.tx.commit(conn)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.tx.rollback(conn) {
                    self.sink.log_error(&format!("rollback failed: {rollback}"));
                }
                Err(e)
            }
        }
    }
}

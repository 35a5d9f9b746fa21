//! # litebridge - Atomic SQL Batches for Host Runtimes
//!
//! litebridge sits between a host runtime (a JS engine, a scripting layer, a
//! JSON-speaking process) and an embedded SQLite database. The host describes
//! a set of writes as a *batch*; litebridge applies it all-or-nothing.
//!
//! - **Atomic batches**: one transaction per batch, rolled back on any error
//! - **Two decoders**: walk host values in place, or stream a JSON payload
//!   forward-only without materializing it
//! - **Compile once**: statements are cached for the life of a batch
//! - **Query paths**: record lookups, raw queries, counts, local storage
//! - **Schema versioning**: setup, reset and migration via `user_version`
//!
//! ## Batch Format
//!
//! ```text
//! batch      = [ operation, ... ]
//! operation  = [ opType, table, sql, argBatches ]
//! argBatches = [ [arg, ...], ... ]        one execution of `sql` each
//! ```
//!
//! `opType` and `table` are carried for the host's bookkeeping; the engine
//! only reads `sql` and `argBatches`.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 WorkerHandle (async, cloneable)                 │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ mpsc + oneshot
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Database (owns the connection)                  │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌────────────────────┐  │
//! │  │ Transaction │  │ Structured /     │  │ Query paths,       │  │
//! │  │ Controller  │  │ Streamed decoder │  │ schema versioning  │  │
//! │  └─────────────┘  └────────┬─────────┘  └────────────────────┘  │
//! │                            ▼                                    │
//! │                   StatementCache (per batch)                    │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            SQLite                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **All or nothing**: a batch either commits completely or leaves the
//!    database exactly as it was
//! 2. **In order**: operations run in sequence order, and ArgBatches within
//!    an operation run in their order
//! 3. **Decoder equivalence**: the same logical batch yields the same state
//!    and the same error kind through either decoder
//! 4. **No leaked statements**: every statement compiled for a batch is
//!    finalized before the batch returns, on every path
//!
//! ## Example
//!
//! ```rust
//! use litebridge::{Database, Value};
//!
//! let mut db = Database::open_in_memory()?;
//! db.execute("CREATE TABLE tasks (id TEXT PRIMARY KEY, title TEXT)", &[])?;
//!
//! db.batch_json(r#"[
//!     [0, "tasks", "INSERT INTO tasks VALUES (?, ?)", [["t1", "write"], ["t2", "test"]]]
//! ]"#)?;
//!
//! let ids = db.query_ids("SELECT id FROM tasks ORDER BY id", &[])?;
//! assert_eq!(ids, vec!["t1", "t2"]);
//!
//! let found = db.find("tasks", "t2")?.expect("row exists");
//! assert_eq!(found.get("title"), Some(&Value::from("test")));
//! # Ok::<(), litebridge::Error>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for litebridge operations.
///
/// A single enum covers statement, transaction, payload, query, and
/// lifecycle failures.
pub mod error;

/// Connection and batch configuration.
pub mod config;

/// Diagnostics sink for info and error messages.
///
/// Defaults to `tracing`; tests capture messages with `MemorySink`.
pub mod diagnostics;

/// Value, operation, and execution result types.
pub mod types;

/// Read access to host runtime values for the structured decoder.
pub mod host;

/// Statement compilation, binding, and the per-batch cache.
pub mod statement;

/// Begin/commit/rollback state machine.
pub mod transaction;

/// The database handle: open, configure, close.
pub mod database;

/// Batch orchestration: transaction scope around a decoder.
pub mod batch;

/// Rows returned by the query paths.
pub mod record;

/// Query paths: find, query, query_ids, count, local storage.
pub mod reader;

/// Schema versioning: compatibility, reset, migration.
pub mod schema;

/// Dedicated worker thread with an async handle.
pub mod worker;

mod streamed;
mod structured;

// =============================================================================
// Re-exports
// =============================================================================

pub use batch::{BatchPayload, BatchStats, DecoderKind};
pub use config::{BeginMode, DatabaseConfig};
pub use database::Database;
pub use diagnostics::{DiagnosticsSink, MemorySink, TracingSink};
pub use error::{Error, Result};
pub use host::{HostNode, HostValue};
pub use record::{ArrayResult, Record};
pub use schema::{Compatibility, MigrationSet, Schema};
pub use transaction::TxState;
pub use types::{ArgBatch, ExecResult, Operation, Value};
pub use worker::{spawn_worker, WorkerHandle};

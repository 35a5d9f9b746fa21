//! # Database Worker
//!
//! Runs a [`Database`] on its own thread and hands out a cloneable async
//! handle to it.
//!
//! ## Why a Dedicated Thread?
//!
//! A `rusqlite::Connection` is `Send` but not `Sync`: one thread at a time.
//! Rather than wrapping it in a mutex, the connection is moved onto a single
//! worker thread and every request is sent to it over a channel:
//!
//! ```text
//! ┌───────────────┐   ┌───────────────┐
//! │ WorkerHandle  │   │ WorkerHandle  │   (clones, any task)
//! └───────┬───────┘   └───────┬───────┘
//!         │  mpsc (bounded)   │
//!         └─────────┬─────────┘
//!                   ▼
//!         ┌───────────────────┐
//!         │  worker thread    │  one request at a time,
//!         │  owns Database    │  in arrival order
//!         └─────────┬─────────┘
//!                   │ oneshot per request
//!                   ▼
//!               caller task
//! ```
//!
//! Requests are applied strictly one after another, so two batches submitted
//! concurrently never interleave: each runs against the state the previous
//! one committed.
//!
//! ## Rust Pattern: Request + oneshot Responder
//!
//! Every request variant carries a `oneshot::Sender` for its own result
//! type. The handle awaits the matching `oneshot::Receiver`, so each caller
//! gets exactly its own answer without any request ids.

use std::thread;

use tokio::sync::{mpsc, oneshot};

use crate::batch::BatchStats;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::types::Value;

/// Bound on queued requests; senders wait when it is full.
const WORKER_CHANNEL_SIZE: usize = 1024;

/// Name given to the worker thread.
pub const WORKER_THREAD_NAME: &str = "litebridge-worker";

// =============================================================================
// Requests
// =============================================================================

enum Request {
    Batch {
        operations: Vec<serde_json::Value>,
        response: oneshot::Sender<Result<BatchStats>>,
    },
    BatchJson {
        payload: String,
        response: oneshot::Sender<Result<BatchStats>>,
    },
    Execute {
        sql: String,
        args: Vec<Value>,
        response: oneshot::Sender<Result<u64>>,
    },
    Query {
        sql: String,
        args: Vec<Value>,
        response: oneshot::Sender<Result<Vec<Record>>>,
    },
    Count {
        sql: String,
        args: Vec<Value>,
        response: oneshot::Sender<Result<i64>>,
    },
    Close {
        response: oneshot::Sender<()>,
    },
}

// =============================================================================
// Handle
// =============================================================================

/// Async handle to a database running on a worker thread.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Request>,
}

impl WorkerHandle {
    /// Applies a structured batch.
    pub async fn batch(&self, operations: Vec<serde_json::Value>) -> Result<BatchStats> {
        self.call(|response| Request::Batch {
            operations,
            response,
        })
        .await?
    }

    /// Applies a batch serialized as JSON text.
    pub async fn batch_json(&self, payload: impl Into<String>) -> Result<BatchStats> {
        let payload = payload.into();
        self.call(|response| Request::BatchJson { payload, response })
            .await?
    }

    /// Executes a single write.
    pub async fn execute(&self, sql: impl Into<String>, args: Vec<Value>) -> Result<u64> {
        let sql = sql.into();
        self.call(|response| Request::Execute {
            sql,
            args,
            response,
        })
        .await?
    }

    /// Runs a record query.
    pub async fn query(&self, sql: impl Into<String>, args: Vec<Value>) -> Result<Vec<Record>> {
        let sql = sql.into();
        self.call(|response| Request::Query {
            sql,
            args,
            response,
        })
        .await?
    }

    /// Runs a single-integer count query.
    pub async fn count(&self, sql: impl Into<String>, args: Vec<Value>) -> Result<i64> {
        let sql = sql.into();
        self.call(|response| Request::Count {
            sql,
            args,
            response,
        })
        .await?
    }

    /// Closes the database and stops the worker.
    ///
    /// Requests already queued ahead of the close still run. Every request
    /// after it fails with `Error::Worker`.
    pub async fn close(&self) -> Result<()> {
        self.call(|response| Request::Close { response }).await
    }

    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(request(response_tx))
            .await
            .map_err(|_| Error::Worker("worker has shut down".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Worker("worker dropped response".to_string()))
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

// =============================================================================
// Worker Loop
// =============================================================================

/// Moves `db` onto a dedicated thread and returns a handle to it.
pub fn spawn_worker(db: Database) -> Result<WorkerHandle> {
    let (tx, rx) = mpsc::channel(WORKER_CHANNEL_SIZE);

    thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run_worker(db, rx))
        .map_err(|e| Error::Worker(format!("failed to spawn worker thread: {e}")))?;

    Ok(WorkerHandle { tx })
}

fn run_worker(mut db: Database, mut rx: mpsc::Receiver<Request>) {
    // A dropped receiver means the caller gave up; the result is discarded.
    while let Some(request) = rx.blocking_recv() {
        match request {
            Request::Batch {
                operations,
                response,
            } => {
                let _ = response.send(db.batch(&operations));
            }
            Request::BatchJson { payload, response } => {
                let _ = response.send(db.batch_json(&payload));
            }
            Request::Execute {
                sql,
                args,
                response,
            } => {
                let _ = response.send(db.execute(&sql, &args));
            }
            Request::Query {
                sql,
                args,
                response,
            } => {
                let _ = response.send(db.query(&sql, &args));
            }
            Request::Count {
                sql,
                args,
                response,
            } => {
                let _ = response.send(db.count(&sql, &args));
            }
            Request::Close { response } => {
                db.close();
                let _ = response.send(());
                break;
            }
        }
    }

    // Channel closed or close requested; close is a no-op if already done.
    db.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spawn() -> WorkerHandle {
        let mut db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (id TEXT PRIMARY KEY, n INTEGER)", &[])
            .unwrap();
        spawn_worker(db).unwrap()
    }

    #[tokio::test]
    async fn test_batch_then_query() {
        let handle = spawn();

        let stats = handle
            .batch(vec![json!([0, "t", "INSERT INTO t VALUES (?, ?)", [["a", 1], ["b", 2]]])])
            .await
            .unwrap();
        assert_eq!(stats.executions, 2);

        let rows = handle
            .query("SELECT id, n FROM t ORDER BY id", vec![])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("n"), Some(&Value::Integer(2)));
    }

    #[tokio::test]
    async fn test_errors_cross_the_channel() {
        let handle = spawn();
        let err = handle
            .batch_json(r#"[[0, "t", "INSERT INTO missing VALUES (?)", [["a"]]]]"#)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSql { .. }));
    }

    #[tokio::test]
    async fn test_close_stops_worker() {
        let handle = spawn();
        handle.close().await.unwrap();

        let err = handle.count("SELECT count(*) FROM t", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
    }
}

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use litebridge::{Database, DatabaseConfig, MemorySink};
use rusqlite::{Connection, OpenFlags};

pub const CREATE_T: &str = "CREATE TABLE t (id TEXT PRIMARY KEY, n INTEGER)";

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let mut db = Database::open(&path).expect("create database");
    db.execute(CREATE_T, &[]).expect("create table");
    (dir, path)
}

/// In-memory database with table `t` and a capturing sink.
pub fn memory_db() -> (Database, Arc<MemorySink>) {
    let sink = MemorySink::new();
    let mut db = Database::open_in_memory_with_sink(sink.clone()).expect("open database");
    db.execute(CREATE_T, &[]).expect("create table");
    (db, sink)
}

pub fn open_file_db(path: &Path) -> (Database, Arc<MemorySink>) {
    let sink = MemorySink::new();
    let db = Database::open_with(path, DatabaseConfig::default(), sink.clone())
        .expect("open database");
    (db, sink)
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

/// Ids in table `t`, sorted.
pub fn ids(db: &Database) -> Vec<String> {
    db.query_ids("SELECT id FROM t ORDER BY id", &[])
        .expect("query ids")
}

/// Every row of `t` as (id, n), sorted by id.
pub fn rows(db: &Database) -> Vec<(String, Option<i64>)> {
    db.unsafe_query_raw("SELECT id, n FROM t ORDER BY id", &[])
        .expect("query rows")
        .into_iter()
        .map(|r| {
            let id = r.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let n = r.get("n").and_then(|v| v.as_i64());
            (id, n)
        })
        .collect()
}

pub fn count_rows(db: &Database) -> i64 {
    db.count("SELECT COUNT(*) FROM t", &[]).expect("count rows")
}

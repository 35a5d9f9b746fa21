//! # Domain Types for Batch Execution
//!
//! This module defines the values that flow through a batch:
//!
//! - [`Value`]: a single bind value or result cell
//! - [`ArgBatch`]: one parameter set for one execution of a statement
//! - [`Operation`]: `(op_type, table, sql, arg_batches)`
//! - [`ExecResult`]: how a single execution ended
//!
//! ## Batch Shape
//!
//! ```text
//! [
//!   [opType, "table", "INSERT INTO t(id) VALUES (?)", [["a"], ["b"]]],
//!   [opType, "table", "UPDATE t SET n = ? WHERE id = ?", [[1, "a"]]],
//! ]
//! ```
//!
//! Only `sql` and `arg_batches` drive execution. `op_type` and `table` travel
//! with the operation for the host's bookkeeping and for diagnostics.

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::ser::{SerializeTuple, Serializer};
use serde::Serialize;

// =============================================================================
// Value
// =============================================================================

/// A scalar SQL value.
///
/// # Typed Binding
///
/// Integers and reals are bound through SQLite's typed bind calls
/// (`sqlite3_bind_int64` / `sqlite3_bind_double`) rather than as text, so the
/// column's type affinity sees the original type and no precision is lost.
///
/// # Booleans
///
/// SQLite has no boolean type. Host booleans become `Integer(1)` / `Integer(0)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Name of the SQLite storage class, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
        }
    }
}

// Rust pattern: From conversions let callers write `vec!["a".into(), 1.into()]`.

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(if value { 1 } else { 0 })
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Argument Batches and Operations
// =============================================================================

/// One parameter set, bound positionally to `?1, ?2, ...`.
pub type ArgBatch = Vec<Value>;

/// A single SQL statement with every parameter set it should run with.
///
/// # Serialization
///
/// Serializes as the positional 4-tuple `[op_type, table, sql, arg_batches]`,
/// which is exactly the shape the streamed decoder reads. Blobs serialize as
/// byte arrays, which JSON cannot tell apart from nested arrays; send blob
/// arguments through the structured path instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Host-defined operation kind. Not interpreted by the engine.
    pub op_type: i64,
    /// Table the operation targets. Not interpreted by the engine.
    pub table: String,
    /// The statement to compile.
    pub sql: String,
    /// Parameter sets, executed in order.
    pub arg_batches: Vec<ArgBatch>,
}

impl Operation {
    pub fn new(
        op_type: i64,
        table: impl Into<String>,
        sql: impl Into<String>,
        arg_batches: Vec<ArgBatch>,
    ) -> Self {
        Self {
            op_type,
            table: table.into(),
            sql: sql.into(),
            arg_batches,
        }
    }

    /// Number of executions this operation will perform.
    pub fn execution_count(&self) -> usize {
        self.arg_batches.len()
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(4)?;
        tuple.serialize_element(&self.op_type)?;
        tuple.serialize_element(&self.table)?;
        tuple.serialize_element(&self.sql)?;
        tuple.serialize_element(&self.arg_batches)?;
        tuple.end()
    }
}

// =============================================================================
// Execution Result
// =============================================================================

/// Outcome of stepping a statement once.
///
/// Engine failures are not a variant here; they come back as `Err` from the
/// executor so `?` can carry them to the batch orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    /// The statement ran to completion without producing a row.
    NoRows,
    /// The statement produced at least one row (`RETURNING`, or a `SELECT`
    /// placed in a batch). The rows are discarded.
    RowsAvailable,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(false), Value::Integer(0));
        assert_eq!(Value::from("a"), Value::Text("a".to_string()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(2.5)), Value::Real(2.5));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Blob(vec![1, 2]));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Integer(3).as_f64(), Some(3.0));
        assert_eq!(Value::Text("x".into()).as_i64(), None);
        assert_eq!(Value::Blob(vec![9]).as_blob(), Some(&[9u8][..]));
        assert!(Value::Null.is_null());
        assert_eq!(Value::Real(1.0).type_name(), "real");
    }

    #[test]
    fn test_operation_serializes_positionally() {
        let op = Operation::new(
            1,
            "tasks",
            "INSERT INTO tasks(id, n) VALUES (?, ?)",
            vec![vec!["a".into(), 1.into()], vec!["b".into(), Value::Null]],
        );

        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                1,
                "tasks",
                "INSERT INTO tasks(id, n) VALUES (?, ?)",
                [["a", 1], ["b", null]]
            ])
        );
        assert_eq!(op.execution_count(), 2);
    }

    #[test]
    fn test_value_to_sql_is_typed() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let kinds: (String, String) = conn
            .query_row(
                "SELECT typeof(?1), typeof(?2)",
                [Value::Integer(7), Value::Real(7.0)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(kinds, ("integer".to_string(), "real".to_string()));
    }
}

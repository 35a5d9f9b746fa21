//! Row materialization for the query paths.

use std::sync::Arc;

use rusqlite::{Row, Statement};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::types::Value;

/// One result row keyed by column name.
///
/// Rows from the same query share their column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the named column. The first match wins for duplicate names.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Column names first, then positional rows.
///
/// Serializes as `[[col, ...], [val, ...], ...]`, or `[]` when there are no
/// rows, which is considerably smaller than a list of keyed objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Serialize for ArrayResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.rows.is_empty() {
            return serializer.serialize_seq(Some(0))?.end();
        }

        let mut seq = serializer.serialize_seq(Some(self.rows.len() + 1))?;
        seq.serialize_element(&self.columns)?;
        for row in &self.rows {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}

pub(crate) fn column_names(stmt: &Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(str::to_string).collect()
}

pub(crate) fn values_from_row(row: &Row<'_>, count: usize) -> rusqlite::Result<Vec<Value>> {
    (0..count).map(|i| row.get_ref(i).map(Value::from)).collect()
}

pub(crate) fn record_from_row(row: &Row<'_>, columns: &Arc<[String]>) -> rusqlite::Result<Record> {
    let values = values_from_row(row, columns.len())?;
    Ok(Record::new(Arc::clone(columns), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        Record::new(
            vec!["id".to_string(), "n".to_string()].into(),
            vec![Value::Text("a".into()), Value::Integer(3)],
        )
    }

    #[test]
    fn test_get_by_column() {
        let r = record();
        assert_eq!(r.get("n"), Some(&Value::Integer(3)));
        assert_eq!(r.get("missing"), None);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_record_serializes_as_map() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json, serde_json::json!({"id": "a", "n": 3}));
    }

    #[test]
    fn test_array_result_shape() {
        let empty = ArrayResult {
            columns: vec!["id".into()],
            rows: vec![],
        };
        assert_eq!(serde_json::to_string(&empty).unwrap(), "[]");

        let result = ArrayResult {
            columns: vec!["id".into(), "n".into()],
            rows: vec![vec!["a".into(), Value::Null]],
        };
        assert_eq!(
            serde_json::to_value(result).unwrap(),
            serde_json::json!([["id", "n"], ["a", null]])
        );
    }
}

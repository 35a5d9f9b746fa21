//! # Query Paths
//!
//! Read operations that run outside any batch transaction. Each goes through
//! the connection's prepared statement cache (`prepare_cached`), so a query
//! the host repeats is compiled once per connection.
//!
//! ## Record Queries Need an `id`
//!
//! [`Database::query`], [`Database::query_as_array`] and
//! [`Database::query_ids`] back record lookups. Their result sets must have
//! `id` as the first column, and every row must carry a non-null id:
//!
//! ```text
//! SELECT id, title FROM tasks   ✓
//! SELECT title, id FROM tasks   ✗  Error::Query("first column must be `id`...")
//! ```
//!
//! [`Database::unsafe_query_raw`] has no such requirement.

use std::sync::Arc;

use rusqlite::{Connection, Row};

use crate::database::{quote_identifier, Database};
use crate::error::{engine_message, Error, Result};
use crate::record::{column_names, record_from_row, values_from_row, ArrayResult, Record};
use crate::statement::bind_all;
use crate::types::Value;

/// Table holding the host's key/value settings.
pub const LOCAL_STORAGE_TABLE: &str = "local_storage";

impl Database {
    /// Fetches the row of `table` whose `id` is `id`.
    pub fn find(&self, table: &str, id: &str) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT * FROM {} WHERE id = ? LIMIT 1",
            quote_identifier(table)
        );
        let mut records = self.query_records(&sql, &[Value::from(id)], false)?;
        Ok(records.pop())
    }

    /// Runs a record query, returning keyed rows.
    pub fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Record>> {
        self.query_records(sql, args, true)
    }

    /// Runs a record query, returning column names once plus positional rows.
    pub fn query_as_array(&self, sql: &str, args: &[Value]) -> Result<ArrayResult> {
        let conn = self.connection()?;
        let mut result = ArrayResult::default();

        run_query(conn, sql, args, |columns, row| {
            if result.columns.is_empty() {
                require_id_column(sql, columns)?;
                result.columns = columns.to_vec();
            }
            let values = values_from_row(row, columns.len()).map_err(|e| read_error(sql, &e))?;
            require_id_value(sql, &values)?;
            result.rows.push(values);
            Ok(())
        })?;

        Ok(result)
    }

    /// Runs a record query and returns only the ids.
    pub fn query_ids(&self, sql: &str, args: &[Value]) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut ids = Vec::new();

        run_query(conn, sql, args, |columns, row| {
            require_id_column(sql, columns)?;
            let id = row.get_ref(0).map(Value::from).map_err(|e| read_error(sql, &e))?;
            ids.push(id_to_string(sql, id)?);
            Ok(())
        })?;

        Ok(ids)
    }

    /// Runs any query and returns every row as a record.
    pub fn unsafe_query_raw(&self, sql: &str, args: &[Value]) -> Result<Vec<Record>> {
        self.query_records(sql, args, false)
    }

    /// Runs a `SELECT COUNT(...)`-style query returning a single integer.
    ///
    /// The query must produce exactly one column and one row.
    pub fn count(&self, sql: &str, args: &[Value]) -> Result<i64> {
        let conn = self.connection()?;
        let mut count = None;

        run_query(conn, sql, args, |columns, row| {
            if columns.len() != 1 {
                return Err(Error::Query(format!(
                    "count query must return exactly one column, got {}: {sql}",
                    columns.len()
                )));
            }
            if count.is_some() {
                return Err(Error::Query(format!(
                    "count query must return exactly one row: {sql}"
                )));
            }
            count = Some(row.get::<_, i64>(0).map_err(|e| read_error(sql, &e))?);
            Ok(())
        })?;

        count.ok_or_else(|| Error::Query(format!("count query returned no rows: {sql}")))
    }

    /// Reads `key` from the local storage table.
    pub fn get_local(&self, key: &str) -> Result<Option<String>> {
        let sql = format!("SELECT value FROM {LOCAL_STORAGE_TABLE} WHERE key = ?");
        let conn = self.connection()?;
        let mut value = None;

        run_query(conn, &sql, &[Value::from(key)], |_, row| {
            if value.is_none() {
                value = row
                    .get::<_, Option<String>>(0)
                    .map_err(|e| read_error(&sql, &e))?;
            }
            Ok(())
        })?;

        Ok(value)
    }

    fn query_records(&self, sql: &str, args: &[Value], require_id: bool) -> Result<Vec<Record>> {
        let conn = self.connection()?;
        let mut records = Vec::new();
        let mut shared: Option<Arc<[String]>> = None;

        run_query(conn, sql, args, |columns, row| {
            if shared.is_none() && require_id {
                require_id_column(sql, columns)?;
            }
            let columns = Arc::clone(shared.get_or_insert_with(|| columns.into()));

            let record = record_from_row(row, &columns).map_err(|e| read_error(sql, &e))?;
            if require_id {
                require_id_value(sql, record.values())?;
            }
            records.push(record);
            Ok(())
        })?;

        Ok(records)
    }
}

/// Prepares `sql` through the connection cache, binds `args`, and hands
/// every row to `on_row` along with the column names.
fn run_query<F>(conn: &Connection, sql: &str, args: &[Value], mut on_row: F) -> Result<()>
where
    F: FnMut(&[String], &Row<'_>) -> Result<()>,
{
    let mut stmt = conn.prepare_cached(sql).map_err(|e| Error::InvalidSql {
        sql: sql.to_string(),
        message: engine_message(&e),
    })?;
    bind_all(&mut stmt, sql, args)?;

    let columns = column_names(&stmt);
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(|e| read_error(sql, &e))? {
        on_row(&columns, row)?;
    }

    Ok(())
}

fn require_id_column(sql: &str, columns: &[String]) -> Result<()> {
    match columns.first() {
        Some(first) if first == "id" => Ok(()),
        _ => Err(Error::Query(format!(
            "first column must be `id`, got {columns:?}: {sql}"
        ))),
    }
}

fn require_id_value(sql: &str, values: &[Value]) -> Result<()> {
    match values.first() {
        Some(id) if !id.is_null() => Ok(()),
        _ => Err(Error::Query(format!("row has a null id: {sql}"))),
    }
}

fn id_to_string(sql: &str, id: Value) -> Result<String> {
    match id {
        Value::Text(s) => Ok(s),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Real(r) => Ok(r.to_string()),
        Value::Null => Err(Error::Query(format!("row has a null id: {sql}"))),
        Value::Blob(_) => Err(Error::Query(format!("row has a blob id: {sql}"))),
    }
}

fn read_error(sql: &str, err: &rusqlite::Error) -> Error {
    Error::Execution {
        sql: sql.to_string(),
        message: engine_message(err),
    }
}

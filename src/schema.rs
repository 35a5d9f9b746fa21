//! # Schema Versioning
//!
//! The host owns the schema; this module only tracks which version of it a
//! database holds and moves the database between versions.
//!
//! The version lives in SQLite's `user_version` pragma, so it is stored in
//! the database header and survives any table being dropped.
//!
//! ## Deciding What To Do At Startup
//!
//! ```text
//! user_version == expected          ─► Compatible
//! user_version == 0                 ─► NeedsSetup        (fresh file)
//! 0 < user_version < expected       ─► NeedsMigration    (from = user_version)
//! user_version > expected, or < 0   ─► NeedsSetup        (downgrade: start over)
//! ```
//!
//! `NeedsSetup` is answered with [`Database::reset_database`], and
//! `NeedsMigration` with [`Database::migrate`]. Both run in a single
//! transaction, so a failure leaves the previous version intact.

use serde::{Deserialize, Serialize};

use crate::database::{quote_identifier, Database};
use crate::error::{engine_message, Error, Result};

// =============================================================================
// Types
// =============================================================================

/// A complete schema at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub version: i64,
    /// DDL creating every table and index, as one SQL script.
    pub sql: String,
}

/// Migration script taking the database from `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSet {
    pub from: i64,
    pub to: i64,
    pub sql: String,
}

/// How a database's stored version relates to the version the host expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Compatibility {
    Compatible,
    NeedsSetup,
    NeedsMigration { from: i64 },
}

// =============================================================================
// Operations
// =============================================================================

impl Database {
    /// The schema version stored in the database header.
    pub fn user_version(&self) -> Result<i64> {
        let conn = self.connection()?;
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    /// Overwrites the stored schema version.
    pub fn set_user_version(&mut self, version: i64) -> Result<()> {
        self.connection()?
            .pragma_update(None, "user_version", version)?;
        Ok(())
    }

    /// Compares the stored version with `expected`.
    pub fn compatibility(&self, expected: i64) -> Result<Compatibility> {
        let version = self.user_version()?;

        let status = if version == expected {
            Compatibility::Compatible
        } else if version == 0 {
            Compatibility::NeedsSetup
        } else if (1..expected).contains(&version) {
            Compatibility::NeedsMigration { from: version }
        } else {
            self.sink.log_info(&format!(
                "database has schema version {version}, expected {expected}; it will be reset"
            ));
            Compatibility::NeedsSetup
        };

        Ok(status)
    }

    /// Runs an SQL script of one or more statements in a single transaction.
    pub fn execute_statements(&mut self, sql: &str) -> Result<()> {
        self.in_transaction(|conn| {
            conn.execute_batch(sql).map_err(|e| Error::Execution {
                sql: sql.to_string(),
                message: engine_message(&e),
            })
        })
    }

    /// Drops every table and view, then installs `schema`.
    ///
    /// Foreign key enforcement is suspended while tables are dropped so the
    /// drop order does not matter.
    pub fn reset_database(&mut self, schema: &Schema) -> Result<()> {
        self.drop_everything()?;

        self.in_transaction(|conn| {
            conn.execute_batch(&schema.sql)
                .map_err(|e| Error::Schema(format!("failed to create schema: {e}")))?;
            conn.pragma_update(None, "user_version", schema.version)?;
            Ok(())
        })?;

        self.sink.log_info(&format!(
            "database reset to schema version {}",
            schema.version
        ));
        Ok(())
    }

    /// Applies `migrations` in one transaction.
    ///
    /// # Errors
    ///
    /// `Error::Schema` if the stored version is not `migrations.from`. The
    /// database is untouched in that case.
    pub fn migrate(&mut self, migrations: &MigrationSet) -> Result<()> {
        let current = self.user_version()?;
        if current != migrations.from {
            return Err(Error::Schema(format!(
                "incompatible migration set: database is at version {current}, migrations start at {}",
                migrations.from
            )));
        }

        self.in_transaction(|conn| {
            conn.execute_batch(&migrations.sql)
                .map_err(|e| Error::Schema(format!("migration failed: {e}")))?;
            conn.pragma_update(None, "user_version", migrations.to)?;
            Ok(())
        })?;

        self.sink.log_info(&format!(
            "migrated schema from version {} to {}",
            migrations.from, migrations.to
        ));
        Ok(())
    }

    fn drop_everything(&mut self) -> Result<()> {
        if self.tx.is_active() {
            return Err(Error::TransactionAlreadyActive);
        }

        let conn = self.connection()?;
        let objects: Vec<(String, String)> = {
            let mut stmt = conn.prepare(
                "SELECT type, name FROM sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        conn.pragma_update(None, "foreign_keys", false)?;
        let dropped = objects.iter().try_for_each(|(kind, name)| {
            let keyword = if kind == "view" { "VIEW" } else { "TABLE" };
            conn.execute_batch(&format!("DROP {keyword} IF EXISTS {}", quote_identifier(name)))
        });
        conn.pragma_update(None, "foreign_keys", self.config.foreign_keys)?;
        dropped?;

        conn.pragma_update(None, "user_version", 0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_v1() -> Schema {
        Schema {
            version: 1,
            sql: "CREATE TABLE tasks (id TEXT PRIMARY KEY, title TEXT);".to_string(),
        }
    }

    #[test]
    fn test_fresh_database_needs_setup() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.user_version().unwrap(), 0);
        assert_eq!(db.compatibility(1).unwrap(), Compatibility::NeedsSetup);
    }

    #[test]
    fn test_compatibility_table() {
        let mut db = Database::open_in_memory().unwrap();

        db.set_user_version(3).unwrap();
        assert_eq!(db.compatibility(3).unwrap(), Compatibility::Compatible);
        assert_eq!(
            db.compatibility(5).unwrap(),
            Compatibility::NeedsMigration { from: 3 }
        );
        assert_eq!(db.compatibility(2).unwrap(), Compatibility::NeedsSetup);

        db.set_user_version(-1).unwrap();
        assert_eq!(db.compatibility(2).unwrap(), Compatibility::NeedsSetup);
    }

    #[test]
    fn test_reset_database_replaces_everything() {
        let mut db = Database::open_in_memory().unwrap();
        db.execute_statements(
            "CREATE TABLE parent (id TEXT PRIMARY KEY);
             CREATE TABLE child (id TEXT PRIMARY KEY, p TEXT REFERENCES parent(id));
             CREATE VIEW v AS SELECT * FROM child;
             INSERT INTO parent VALUES ('p');
             INSERT INTO child VALUES ('c', 'p');",
        )
        .unwrap();

        db.reset_database(&schema_v1()).unwrap();

        assert_eq!(db.user_version().unwrap(), 1);
        let names: Vec<String> = db
            .unsafe_query_raw(
                "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name",
                &[],
            )
            .unwrap()
            .into_iter()
            .filter_map(|r| r.get("name").and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["tasks"]);
    }

    #[test]
    fn test_migrate() {
        let mut db = Database::open_in_memory().unwrap();
        db.reset_database(&schema_v1()).unwrap();

        let step = MigrationSet {
            from: 1,
            to: 2,
            sql: "ALTER TABLE tasks ADD COLUMN done INTEGER;".to_string(),
        };
        db.migrate(&step).unwrap();
        assert_eq!(db.user_version().unwrap(), 2);
        assert_eq!(db.compatibility(2).unwrap(), Compatibility::Compatible);

        // Applying the same set again is refused without touching anything.
        let err = db.migrate(&step).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
        assert_eq!(db.user_version().unwrap(), 2);
    }

    #[test]
    fn test_failed_migration_keeps_old_version() {
        let mut db = Database::open_in_memory().unwrap();
        db.reset_database(&schema_v1()).unwrap();

        let broken = MigrationSet {
            from: 1,
            to: 2,
            sql: "ALTER TABLE tasks ADD COLUMN done INTEGER; NOT SQL;".to_string(),
        };
        assert!(matches!(db.migrate(&broken), Err(Error::Schema(_))));
        assert_eq!(db.user_version().unwrap(), 1);

        let columns = db.query_as_array("SELECT * FROM tasks", &[]).unwrap();
        assert!(columns.rows.is_empty());
        let info = db
            .unsafe_query_raw("SELECT name FROM pragma_table_info('tasks')", &[])
            .unwrap();
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn test_execute_statements_is_atomic() {
        let mut db = Database::open_in_memory().unwrap();
        db.execute_statements("CREATE TABLE t (id TEXT PRIMARY KEY);")
            .unwrap();

        let err = db
            .execute_statements("INSERT INTO t VALUES ('a'); INSERT INTO t VALUES ('a');")
            .unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(db.count("SELECT count(*) FROM t", &[]).unwrap(), 0);
    }
}

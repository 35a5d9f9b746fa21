//! # Connection Configuration
//!
//! [`DatabaseConfig`] collects the knobs a host can set when opening a
//! connection. Every field has a default, so `DatabaseConfig::default()` is a
//! working configuration. The struct also derives `Deserialize` so a host can
//! hand it over as JSON, with missing fields falling back to defaults.

use std::time::Duration;

use serde::Deserialize;

// =============================================================================
// Defaults
// =============================================================================

/// Default number of compiled statements kept per batch scope.
///
/// A batch with more distinct SQL strings than this evicts the least recently
/// used statement (finalizing it) and recompiles on next use.
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 64;

/// Default capacity of the connection-level cache used by query paths.
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 16;

/// Default time to wait on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// Begin Mode
// =============================================================================

/// How a batch transaction acquires the database lock.
///
/// Maps directly onto SQLite's `BEGIN DEFERRED | IMMEDIATE | EXCLUSIVE`.
/// `Immediate` is the default: the write lock is taken up front, so a batch
/// never fails halfway through with `SQLITE_BUSY` on lock upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeginMode {
    Deferred,
    #[default]
    Immediate,
    Exclusive,
}

impl BeginMode {
    /// The SQL statement that opens a transaction in this mode.
    pub fn begin_sql(&self) -> &'static str {
        match self {
            BeginMode::Deferred => "BEGIN DEFERRED",
            BeginMode::Immediate => "BEGIN IMMEDIATE",
            BeginMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Configuration for a [`Database`](crate::Database) connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Lock acquisition mode for batch transactions.
    pub begin_mode: BeginMode,

    /// Maximum compiled statements held by one batch's statement cache.
    pub statement_cache_capacity: usize,

    /// Capacity of the connection-level prepared statement cache (query paths).
    pub query_cache_capacity: usize,

    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,

    /// Switch file databases to WAL journaling. Ignored for in-memory databases.
    pub journal_mode_wal: bool,

    /// Enforce foreign key constraints.
    pub foreign_keys: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            begin_mode: BeginMode::default(),
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode_wal: true,
            foreign_keys: true,
        }
    }
}

impl DatabaseConfig {
    /// Busy timeout as a `Duration`.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

//! Diagnostics sink injected into each [`Database`](crate::Database).
//!
//! Nothing in this crate logs through a global. A connection receives an
//! `Arc<dyn DiagnosticsSink>` when it is opened and reports lifecycle events
//! (open, close, batch outcome, swallowed teardown failures) through it.

use std::sync::{Arc, Mutex};

/// Receiver for connection diagnostics.
pub trait DiagnosticsSink: Send + Sync {
    fn log_info(&self, message: &str);
    fn log_error(&self, message: &str);
}

/// Forwards diagnostics to `tracing` under the `litebridge` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn log_info(&self, message: &str) {
        tracing::info!(target: "litebridge", "{message}");
    }

    fn log_error(&self, message: &str) {
        tracing::error!(target: "litebridge", "{message}");
    }
}

/// Severity of a recorded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// Keeps every message in memory.
///
/// Useful for hosts that drain logs into their own console, and for tests
/// that assert on what was reported.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all recorded messages, oldest first.
    pub fn entries(&self) -> Vec<(Level, String)> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages recorded at `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    fn push(&self, level: Level, message: &str) {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push((level, message.to_string()));
    }
}

impl DiagnosticsSink for MemorySink {
    fn log_info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn log_error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}

/// The sink used when the caller does not supply one.
pub fn default_sink() -> Arc<dyn DiagnosticsSink> {
    Arc::new(TracingSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.log_info("opened");
        sink.log_error("close failed");
        sink.log_info("closed");

        assert_eq!(
            sink.entries(),
            vec![
                (Level::Info, "opened".to_string()),
                (Level::Error, "close failed".to_string()),
                (Level::Info, "closed".to_string()),
            ]
        );
        assert_eq!(sink.messages(Level::Error), vec!["close failed".to_string()]);
    }
}

//! Logging Sink
//!
//! The engine reports progress and skipped work through [`CoverageLogger`]
//! and owns no particular sink. [`NullLogger`] discards everything,
//! [`TracingLogger`] forwards to `tracing`, and [`MemoryLogger`] keeps the
//! entries around for inspection.

use std::error::Error;
use std::sync::{Arc, Mutex};

/// Leveled message sink consumed by the engine
pub trait CoverageLogger: Send + Sync {
    /// Diagnostic detail
    fn verbose(&self, message: &str);

    /// Progress information. `important` marks messages a quiet host should still show.
    fn info(&self, message: &str, important: bool);

    /// Recoverable problem
    fn warning(&self, message: &str);

    /// Error described by a message
    fn error(&self, message: &str);

    /// Error described by its cause
    fn error_cause(&self, cause: &dyn Error) {
        self.error(&cause.to_string());
    }
}

impl<L: CoverageLogger + ?Sized> CoverageLogger for Arc<L> {
    fn verbose(&self, message: &str) {
        (**self).verbose(message);
    }

    fn info(&self, message: &str, important: bool) {
        (**self).info(message, important);
    }

    fn warning(&self, message: &str) {
        (**self).warning(message);
    }

    fn error(&self, message: &str) {
        (**self).error(message);
    }

    fn error_cause(&self, cause: &dyn Error) {
        (**self).error_cause(cause);
    }
}

/// Logger that drops every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl CoverageLogger for NullLogger {
    fn verbose(&self, _message: &str) {}
    fn info(&self, _message: &str, _important: bool) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Logger that forwards to the `tracing` macros
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl CoverageLogger for TracingLogger {
    fn verbose(&self, message: &str) {
        tracing::debug!(target: "covweave", "{message}");
    }

    fn info(&self, message: &str, important: bool) {
        if important {
            tracing::info!(target: "covweave", important = true, "{message}");
        } else {
            tracing::info!(target: "covweave", "{message}");
        }
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "covweave", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "covweave", "{message}");
    }

    fn error_cause(&self, cause: &dyn Error) {
        tracing::error!(target: "covweave", error = %cause, "operation failed");
    }
}

/// Log level of a recorded entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Diagnostic detail
    Verbose,
    /// Progress information
    Information,
    /// Recoverable problem
    Warning,
    /// Error
    Error,
}

/// A recorded log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Level
    pub level: LogLevel,
    /// Message text
    pub message: String,
    /// Importance flag (information only)
    pub important: bool,
}

/// Logger that keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    /// Create an empty logger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: LogLevel, message: &str, important: bool) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                level,
                message: message.to_string(),
                important,
            });
        }
    }

    /// Snapshot of all entries
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Entries at the given level
    #[must_use]
    pub fn at_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }

    /// Whether any entry contains `needle`
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message.contains(needle))
    }
}

impl CoverageLogger for MemoryLogger {
    fn verbose(&self, message: &str) {
        self.push(LogLevel::Verbose, message, false);
    }

    fn info(&self, message: &str, important: bool) {
        self.push(LogLevel::Information, message, important);
    }

    fn warning(&self, message: &str) {
        self.push(LogLevel::Warning, message, false);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_logger_accepts_everything() {
        let logger = NullLogger;
        logger.verbose("v");
        logger.info("i", true);
        logger.warning("w");
        logger.error("e");
        logger.error_cause(&std::io::Error::other("boom"));
    }

    #[test]
    fn test_memory_logger_records_levels() {
        let logger = MemoryLogger::new();
        logger.verbose("detail");
        logger.info("started", true);
        logger.warning("skipped member");
        logger.error_cause(&std::io::Error::other("disk full"));

        let entries = logger.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[1].level, LogLevel::Information);
        assert!(entries[1].important);
        assert_eq!(logger.at_level(LogLevel::Error)[0].message, "disk full");
        assert!(logger.contains("skipped"));
    }

    #[test]
    fn test_arc_forwarding() {
        let logger = Arc::new(MemoryLogger::new());
        let shared: Arc<dyn CoverageLogger> = logger.clone();
        shared.warning("via arc");
        assert!(logger.contains("via arc"));
    }
}

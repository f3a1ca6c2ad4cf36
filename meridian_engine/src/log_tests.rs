//! Unit tests for the logging module
//!
//! The logger is process-global, so every test filters captured entries by a
//! source string unique to that test instead of asserting on totals.

use crate::error::Error;
use crate::log::{set_logger, reset_logger, LogEntry, LogSeverity, Logger};
use crate::{engine_bail, engine_err, engine_error, engine_info};
use std::sync::{Arc, Mutex};

/// Test logger that records every entry it receives
struct CaptureLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl CaptureLogger {
    fn install() -> Arc<CaptureLogger> {
        let logger = Arc::new(CaptureLogger {
            entries: Mutex::new(Vec::new()),
        });
        set_logger(logger.clone());
        logger
    }

    fn entries_for(&self, source: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

#[test]
fn test_custom_logger_receives_entries() {
    let logger = CaptureLogger::install();

    engine_info!("meridian::log_tests::receive", "hello {}", 42);

    let entries = logger.entries_for("meridian::log_tests::receive");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Info);
    assert_eq!(entries[0].message, "hello 42");
    assert!(entries[0].file.is_none());

    reset_logger();
}

#[test]
fn test_error_macro_carries_file_and_line() {
    let logger = CaptureLogger::install();

    engine_error!("meridian::log_tests::detailed", "broke: {}", "badly");

    let entries = logger.entries_for("meridian::log_tests::detailed");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Error);
    assert!(entries[0].file.is_some());
    assert!(entries[0].line.is_some());

    reset_logger();
}

#[test]
fn test_engine_err_logs_and_returns_error() {
    let logger = CaptureLogger::install();

    let err = engine_err!("meridian::log_tests::err", "code {}", -3);
    match err {
        Error::BackendError(msg) => assert_eq!(msg, "code -3"),
        other => panic!("Expected BackendError, got {:?}", other),
    }

    let entries = logger.entries_for("meridian::log_tests::err");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "code -3");

    reset_logger();
}

#[test]
fn test_engine_bail_returns_early() {
    fn failing(flag: bool) -> crate::error::Result<u32> {
        if flag {
            engine_bail!("meridian::log_tests::bail", "rejected");
        }
        Ok(7)
    }

    let logger = CaptureLogger::install();

    assert_eq!(failing(false).unwrap(), 7);
    assert!(matches!(failing(true), Err(Error::BackendError(_))));
    assert_eq!(logger.entries_for("meridian::log_tests::bail").len(), 1);

    reset_logger();
}

#[test]
fn test_severity_ordering() {
    // Custom loggers rely on this ordering to threshold-filter
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

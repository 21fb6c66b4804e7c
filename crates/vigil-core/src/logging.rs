//! Logging infrastructure for Vigil.
//!
//! This module provides structured logging using the `tracing` ecosystem.
//! The engine is headless from the feed's point of view, so its own logs
//! are the primary record of dropped frames, reconnect attempts, and
//! dismissed notifications.
//!
//! ## Features
//!
//! - JSON lines format for machine parsing
//! - File output to `~/.vigil/logs/vigil.log`
//! - Console output with configurable verbosity
//! - `--verbose` flag support for debug-level logging
//!
//! ## Example
//!
//! ```no_run
//! use vigil_core::logging;
//!
//! // Initialize logging (call once at startup)
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! // Use tracing macros
//! tracing::info!("vigil started");
//! tracing::debug!(alert_id = "b9c2", "alert admitted");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{Result, VigilError};

/// Guard that must be held to ensure log flushing on shutdown.
///
/// When this guard is dropped, it flushes any pending log entries.
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the Vigil logging system.
///
/// This sets up:
/// - File logging to `~/.vigil/logs/vigil.log` (JSON lines format)
/// - Console logging to stderr (human-readable format)
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.vigil/logs/`
/// * `verbose` - If true, sets log level to DEBUG. Otherwise uses INFO.
///
/// # Returns
///
/// A [`LogGuard`] that must be held for the application lifetime to ensure
/// logs are properly flushed on shutdown.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    // Determine log directory
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    // Ensure log directory exists
    std::fs::create_dir_all(&log_dir).map_err(|e| VigilError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    // Set up file appender for JSON logs
    let file_appender = tracing_appender::rolling::daily(&log_dir, "vigil.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    // Determine log level based on verbose flag and environment
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Covers the binary and every vigil_* member crate target.
        EnvFilter::new(format!(
            "vigil={default_level},vigil_core={default_level},vigil_config={default_level},vigil_engine={default_level}"
        ))
    });

    // JSON layer for file output
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    // Human-readable layer for console output
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    // Combine layers with filter. A second init keeps the first
    // subscriber; the guard still flushes the file layer on drop.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for testing.
///
/// This is a simpler alternative to [`init_logging`] that only logs to stderr.
/// Useful for tests and development.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Get the default log directory path.
///
/// Returns `~/.vigil/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| VigilError::Internal {
        message: "home directory could not be determined".into(),
    })?;

    Ok(home.join(".vigil").join("logs"))
}

/// Get the default Vigil log file path.
///
/// Returns `~/.vigil/logs/vigil.log`
pub fn default_log_file() -> Result<PathBuf> {
    Ok(default_log_dir()?.join("vigil.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_dir() {
        let dir = default_log_dir().unwrap();
        assert!(dir.ends_with(".vigil/logs"));
    }

    #[test]
    fn test_default_log_file() {
        let file = default_log_file().unwrap();
        assert!(file.ends_with(".vigil/logs/vigil.log"));
    }

    #[test]
    fn test_init_test_logging() {
        // Should not panic
        init_test_logging();
    }

    #[test]
    fn test_init_logging_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("logs");
        // A second init in the same process fails to set the global
        // subscriber, but the directory must exist either way.
        let _ = init_logging(Some(log_dir.clone()), false);
        assert!(log_dir.exists());
    }
}

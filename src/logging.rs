//! Tracing setup.
//!
//! Dual output: console logs at the caller's level and a full trace log on
//! disk, overwritten on every run. Extractor stderr only ever lands here.

use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const LOG_FILE_NAME: &str = "stream-resolver-last-run.log";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("cannot prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Install console + file logging. Returns the path of the trace file.
///
/// `RUST_LOG` overrides `console_level` for the console layer; the file
/// layer always records everything.
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<PathBuf, LoggingError> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    let log_file_path = logs_path.join(LOG_FILE_NAME);

    create_dir_all(logs_path).map_err(|source| LoggingError::LogFile {
        path: logs_path.to_path_buf(),
        source,
    })?;
    let log_file = File::create(&log_file_path).map_err(|source| LoggingError::LogFile {
        path: log_file_path.clone(),
        source,
    })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        console = %console_level,
        trace_file = %log_file_path.display(),
        "tracing initialized"
    );
    Ok(log_file_path)
}

/// Console-only test subscriber. Safe to call from every test.
pub fn init_for_tests() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

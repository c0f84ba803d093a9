//! Tracing configuration and log routing.
//!
//! Logs go to stdout with a compact formatter and, unless disabled, to a file. When
//! `RUSTY_RAG_LOG_FILE` is set, logs are appended to that path; otherwise they land in
//! `logs/rustyrag.log`. File output goes through a non-blocking writer.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "rustyrag.log";

/// Where, if anywhere, file logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLogging {
    /// Stdout only.
    Disabled,
    /// `logs/rustyrag.log`.
    Default,
    /// Append to an explicit file.
    Path(PathBuf),
}

impl FileLogging {
    /// `RUSTY_RAG_LOG_FILE` when set, the default file otherwise.
    pub fn from_env() -> Self {
        match std::env::var("RUSTY_RAG_LOG_FILE") {
            Ok(path) if !path.trim().is_empty() => Self::Path(PathBuf::from(path)),
            _ => Self::Default,
        }
    }
}

/// Configure tracing subscribers for stdout and optional file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Keeps the non-blocking writer's guard alive for the process lifetime.
/// - Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing(file_logging: FileLogging) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let result = if let Some(writer) = configure_file_writer(&file_logging) {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).try_init()
    } else {
        registry.try_init()
    };

    if let Err(err) = result {
        eprintln!("Tracing already initialized: {err}");
    }
}

/// Build a non-blocking writer for file logging.
///
/// Returns `None` when file logging is disabled or the target cannot be opened.
fn configure_file_writer(file_logging: &FileLogging) -> Option<NonBlocking> {
    match file_logging {
        FileLogging::Disabled => None,
        FileLogging::Path(path) => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(file) => {
                    let (non_blocking, guard) = tracing_appender::non_blocking(file);
                    let _ = LOG_GUARD.set(guard);
                    Some(non_blocking)
                }
                Err(err) => {
                    eprintln!("Failed to open log file {}: {err}", path.display());
                    None
                }
            }
        }
        FileLogging::Default => {
            if let Err(err) = std::fs::create_dir_all(DEFAULT_LOG_DIR) {
                eprintln!("Failed to create logs directory: {err}");
                return None;
            }
            let file_appender = tracing_appender::rolling::never(DEFAULT_LOG_DIR, DEFAULT_LOG_FILE);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
    }
}

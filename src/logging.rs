//! Logging setup: human-readable output on stderr, plus an optional JSONL
//! file for later inspection.
//!
//! The returned guard must be held until exit so the file writer flushes.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber. `verbose` raises the default level to debug;
/// `RUST_LOG` overrides both.
pub fn init(log_file: Option<&Path>, verbose: bool) -> LoggingGuard {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let mut file_guard = None;
    let file_layer = log_file.and_then(|path| {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("[LOGGING] Failed to create log directory: {}", e);
            }
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let (writer, guard) = tracing_appender::non_blocking(file);
                file_guard = Some(guard);
                Some(
                    fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_target(true)
                        .with_current_span(false),
                )
            }
            Err(e) => {
                eprintln!("[LOGGING] Failed to open log file {}: {}", path.display(), e);
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    LoggingGuard {
        _file_guard: file_guard,
    }
}

//! Tracing subscriber setup

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber
///
/// Logs go to stderr, or to `log_file` when given. The returned guard flushes
/// the file writer on drop and must be kept alive for the program's lifetime.
pub fn init(log_file: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let Some(log_file) = log_file else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr))
            .with(env_filter())
            .init();
        return Ok(None);
    };

    let dir = log_file.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let file_name = log_file
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log path has no file name"))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(env_filter())
        .init();
    Ok(Some(guard))
}

//! Log subscriber setup.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;
use crate::error::LoggingError;

/// Filter from `RUST_LOG` if set, otherwise from the configured level.
pub fn filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Install the global subscriber.
///
/// With a log file, lines go through a non-blocking appender and the
/// returned guard must live until shutdown so buffered lines are flushed.
pub fn init(settings: &LoggingSettings) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = filter(settings);

    let Some(file) = &settings.file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish()
            .try_init()?;
        return Ok(None);
    };

    let (dir, name) = split_log_path(file)?;
    fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    // Rotation of the log itself is left to logrotate.
    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking)
        .finish()
        .try_init()?;

    Ok(Some(guard))
}

fn split_log_path(file: &Path) -> Result<(&Path, &std::ffi::OsStr), LoggingError> {
    let name = file
        .file_name()
        .ok_or_else(|| LoggingError::InvalidFile(file.to_path_buf()))?;
    let dir = match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    Ok((dir, name))
}

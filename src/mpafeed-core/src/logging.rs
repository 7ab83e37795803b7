use crate::{config::LoggingConfig, paths::AppDirs};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

/// Overrides the configured level with a full filter directive.
pub const LOG_ENV: &str = "MPAFEED_LOG";

const DEFAULT_FILE_NAME: &str = "mpafeed.log";

/// Keeps the non-blocking file writer alive; logs are flushed when dropped.
pub struct LoggingGuard {
    log_file: Option<PathBuf>,
    _file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Stem of the daily-rolled log files, when file logging is on.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Installs the global subscriber.
///
/// Console output goes to stderr so command output on stdout stays
/// machine-readable.
pub fn init_logging(config: &LoggingConfig, dirs: &AppDirs) -> Result<LoggingGuard, LoggingError> {
    let filter = build_filter(config, std::env::var(LOG_ENV).ok().as_deref())?;

    let (file_writer, file_guard, log_file) = if config.file {
        let log_dir = dirs.log_dir();
        fs::create_dir_all(&log_dir).map_err(|source| LoggingError::CreateDirectory {
            path: log_dir.clone(),
            source,
        })?;
        let stem = config.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME);
        prune_rolled_logs(&log_dir, stem, config.max_log_files.max(1))?;
        let (writer, guard) = open_file_writer(&log_dir, stem);
        (Some(writer), Some(guard), Some(log_dir.join(stem)))
    } else {
        (None, None, None)
    };

    let writer = match (config.console, file_writer) {
        (true, Some(file)) => BoxMakeWriter::new(std::io::stderr.and(file)),
        (false, Some(file)) => BoxMakeWriter::new(file),
        // Nothing configured still reports errors somewhere.
        (false, None) => {
            BoxMakeWriter::new(std::io::stderr.with_max_level(tracing::Level::ERROR))
        }
        (true, None) => BoxMakeWriter::new(std::io::stderr),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_ansi(config.console && !config.file)
        .with_writer(writer)
        .try_init()
        .map_err(LoggingError::SubscriberInstall)?;

    Ok(LoggingGuard {
        log_file,
        _file_guard: file_guard,
    })
}

fn build_filter(config: &LoggingConfig, env: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let directive = match env {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ => config.level.as_filter_directive(),
    };
    EnvFilter::try_new(directive).map_err(|source| LoggingError::ParseLevel {
        level: directive.to_string(),
        source,
    })
}

fn open_file_writer(log_dir: &Path, stem: &str) -> (NonBlocking, WorkerGuard) {
    let appender = tracing_appender::rolling::daily(log_dir, stem);
    tracing_appender::non_blocking(appender)
}

/// Removes the oldest `stem*` files so at most `keep` remain.
fn prune_rolled_logs(dir: &Path, stem: &str, keep: usize) -> Result<(), LoggingError> {
    let listing = fs::read_dir(dir).map_err(|source| LoggingError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut rolled: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in listing.flatten() {
        if !entry.file_name().to_string_lossy().starts_with(stem) {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|meta| meta.modified()) {
            rolled.push((modified, entry.path()));
        }
    }
    if rolled.len() <= keep {
        return Ok(());
    }

    rolled.sort();
    let excess = rolled.len() - keep;
    for (_, path) in rolled.into_iter().take(excess) {
        fs::remove_file(&path).map_err(|source| LoggingError::Cleanup { path, source })?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid log filter {level}: {source}")]
    ParseLevel {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to list log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove old log file {path}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}

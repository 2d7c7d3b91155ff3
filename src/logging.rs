//! `tracing` subscriber setup.
//!
//! Filter precedence: `RUST_LOG`, then `--verbose` (debug), then
//! `[logging] level`. Warnings and errors go to stderr; with `[logging] file`
//! every event at the filter level is also written to `.primer/logs/primer.log`
//! in plain or JSON format.

use crate::primer_config::{LogFormat, LoggingConfig};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

pub const LOG_FILE: &str = "primer.log";

/// Keeps the non-blocking file writer alive; drop it last to flush.
pub struct LoggingGuard {
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
    log_file: Option<PathBuf>,
}

impl LoggingGuard {
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

/// Build the global filter.
pub fn env_filter(level: &str, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { level };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. `log_dir` is `None` when the project has
/// no `.primer/` directory yet. Installing twice keeps the first subscriber.
pub fn init(config: &LoggingConfig, log_dir: Option<&Path>, verbose: bool) -> Result<LoggingGuard> {
    let mut guard = LoggingGuard {
        _file: None,
        log_file: None,
    };

    let file_layer: Option<Box<dyn Layer<Registry> + Send + Sync>> =
        match log_dir.filter(|_| config.file) {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
                let appender = tracing_appender::rolling::never(dir, LOG_FILE);
                let (non_blocking, worker) = tracing_appender::non_blocking(appender);
                guard._file = Some(worker);
                guard.log_file = Some(dir.join(LOG_FILE));
                Some(match config.format {
                    LogFormat::Json => fmt::layer().json().with_writer(non_blocking).boxed(),
                    LogFormat::Plain => fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking)
                        .boxed(),
                })
            }
            None => None,
        };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_level);

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter(&config.level, verbose))
        .try_init();
    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }

    Ok(guard)
}

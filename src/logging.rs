use crate::config::LoggingConfig;
use crate::constants::STATUS_TARGET;
use crate::error::{IngestError, Result};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "medsupply=info,info";

/// Keeps the background log writers alive; drop it at exit to flush.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Initializes console output plus three daily-rotated files:
/// `combined.log` (everything, JSON), `error.log` (errors only, JSON) and
/// `status.log` (one line per run outcome).
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuards> {
    fs::create_dir_all(&config.dir)?;

    let (combined, combined_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&config.dir, "combined.log"));
    let (errors, error_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&config.dir, "error.log"));
    let (status, status_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&config.dir, "status.log"));

    let combined_layer = fmt::layer().json().with_writer(combined);
    let error_layer = fmt::layer()
        .json()
        .with_writer(errors)
        .with_filter(LevelFilter::ERROR);
    let status_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(status)
        .with_filter(filter_fn(|meta| meta.target() == STATUS_TARGET));

    let console_json = config
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stdout));
    let console_text = (!config.json).then(|| fmt::layer().with_writer(std::io::stdout));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(combined_layer)
        .with(error_layer)
        .with(status_layer)
        .with(console_json)
        .with(console_text)
        .try_init()
        .map_err(|e| IngestError::Config(format!("logging already initialized: {e}")))?;

    Ok(LogGuards {
        _guards: vec![combined_guard, error_guard, status_guard],
    })
}

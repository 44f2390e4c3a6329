use std::env;
use std::fs;
use std::io;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{Config, LOG_FILE_NAME, LOG_FILTER_ENV};

/// Console default: stay quiet unless something went wrong.
const STDERR_DEFAULT_FILTER: &str = "bmi_ledger=warn,sqlx=warn";

fn stderr_filter() -> EnvFilter {
    env::var(LOG_FILTER_ENV)
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(STDERR_DEFAULT_FILTER))
}

/// Install the stderr JSON subscriber. Safe to call more than once; only
/// the first call wins. `log` records are bridged into `tracing`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(stderr_filter())
        .with_writer(io::stderr)
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .try_init();
}

/// Install stderr logging plus a daily-rotated JSON file under
/// `config.logs_dir()`. Keep the returned guard alive until exit so the
/// background writer can flush.
pub fn init_file_logging(config: &Config) -> anyhow::Result<WorkerGuard> {
    let logs_dir = config.logs_dir();
    fs::create_dir_all(&logs_dir)
        .with_context(|| format!("create log directory {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::daily(&logs_dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_filter =
        EnvFilter::try_new(&config.log_filter).context("parse log filter")?;

    let file_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer)
        .with_filter(file_filter);
    let stderr_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(io::stderr)
        .with_filter(stderr_filter());

    if tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!(target: "bmi_ledger", event = "logging_already_initialized");
    }

    tracing::info!(
        target: "bmi_ledger",
        event = "logging_ready",
        logs_dir = %logs_dir.display()
    );
    Ok(guard)
}

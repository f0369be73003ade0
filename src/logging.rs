//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Two modes:
//! - **Production** ([`init_production`]): JSON through a non-blocking writer,
//!   to stderr or a daily-rotated file
//! - **Development** ([`init_development`]): human-readable stderr output
//!
//! `RUST_LOG` always wins; otherwise the level is `debug` in debug mode and
//! `info` elsewhere.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Log file prefix inside the logs directory.
const LOG_FILE_PREFIX: &str = "tgbridge.log";

/// Holds the non-blocking writer guard for production logging.
///
/// The [`WorkerGuard`] must be kept alive for the duration of the process.
/// Dropping it flushes pending log entries.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

fn env_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug)))
}

/// Initialise JSON logging.
///
/// Writes to `{logs_dir}/tgbridge.log.YYYY-MM-DD` with daily rotation when a
/// directory is given, otherwise to stderr.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_production(logs_dir: Option<&Path>) -> anyhow::Result<LoggingGuard> {
    let (writer, guard) = match logs_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                anyhow::anyhow!("failed to create logs directory {}: {e}", dir.display())
            })?;
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(env_filter(false))
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .try_init()?;

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise human-readable stderr logging.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_development(debug: bool) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(debug))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}

/// Pick a mode from settings. Debug mode always uses the development format.
///
/// # Errors
///
/// See [`init_production`] and [`init_development`].
pub fn init(settings: &LoggingSettings) -> anyhow::Result<Option<LoggingGuard>> {
    if settings.production && !settings.debug {
        init_production(settings.dir.as_deref()).map(Some)
    } else {
        init_development(settings.debug).map(|()| None)
    }
}

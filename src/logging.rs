//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Console output always goes to stderr: stdout carries the host protocol.
//! When a log directory is configured, a JSON layer with daily rotation is
//! added alongside it.

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Log file prefix inside the log directory.
const LOG_FILE_PREFIX: &str = "telegram-activities.log";

/// Holds the non-blocking writer guard for file logging.
///
/// Dropping it flushes pending log entries and closes the file, so keep it
/// alive for the duration of the process.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable stderr layer, generic over the subscriber it stacks on.
fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::layer().with_writer(std::io::stderr)
}

/// Initialise logging for the `start` subcommand.
///
/// With `logs_dir`, writes JSON logs to
/// `{logs_dir}/telegram-activities.log.YYYY-MM-DD` and returns the guard.
/// Human-readable stderr output is always enabled, filtered by `RUST_LOG`
/// (default: `info`).
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init(logs_dir: Option<&Path>) -> anyhow::Result<Option<LoggingGuard>> {
    let Some(dir) = logs_dir else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(console_layer())
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir).map_err(|e| {
        anyhow::anyhow!("failed to create logs directory {}: {e}", dir.display())
    })?;

    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json_layer)
        .with(console_layer())
        .init();

    Ok(Some(LoggingGuard { _guard: guard }))
}

/// Initialise stderr-only logging for one-shot subcommands.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

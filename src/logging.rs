//! `tracing` subscriber setup for the relay binary.
//!
//! - [`init_production`]: rotated JSON log file plus stderr, for `start`
//! - [`init_cli`]: stderr only, for one-shot commands such as `send`
//!
//! Both honour `RUST_LOG` when set.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix for rotated log files.
pub const LOG_FILE_PREFIX: &str = "discord-relay.log";

/// Keeps the background log writer alive.
///
/// Dropping it flushes buffered entries, so hold it until the process exits.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install JSON logging to `{logs_dir}/discord-relay.log.YYYY-MM-DD` plus a
/// human-readable stderr layer. Default level is `info`.
///
/// # Errors
///
/// Returns an error if `logs_dir` cannot be created or a global subscriber is
/// already installed.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Install stderr logging at `warn` so command output stays readable.
///
/// If a subscriber is already installed it is kept and a warning is logged
/// through it.
pub fn init_cli() {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(std::io::stderr)
        .try_init()
    {
        tracing::warn!(error = %e, "tracing subscriber already installed (best-effort)");
    }
}

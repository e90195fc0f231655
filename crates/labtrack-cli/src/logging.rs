//! Tracing subscriber setup.

use std::io;

use anyhow::{Context, Result};
use labtrack_core::config::{self, Config};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub const LOG_ENV: &str = "LABTRACK_LOG";
const DEFAULT_DIRECTIVE: &str = "warn";
const LOG_FILE_PREFIX: &str = "labtrack.log";

/// Installs the global subscriber.
///
/// Filtering comes from `LABTRACK_LOG` (default `warn`). With `log_to_file`
/// set, events are also written to a daily file under the logs directory;
/// the returned guard must be held until exit so the file is flushed.
pub fn init(config: &Config) -> Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer().with_writer(io::stderr).with_target(false);

    if config.log_to_file {
        let dir = config::paths::logs_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .try_init()
            .context("install tracing subscriber")?;
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(stderr_layer)
            .try_init()
            .context("install tracing subscriber")?;
        Ok(None)
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

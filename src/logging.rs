use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

pub const LOG_ENV: &str = "SMARTVOTE_LOG";
const LOG_FILE: &str = "smartvote.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// The TUI owns the terminal, so logs go to a file in the config dir
    File,
    Stderr,
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Keep the returned guard alive until exit so
/// buffered file output is flushed.
pub fn init(target: LogTarget) -> Result<Option<WorkerGuard>> {
    match target {
        LogTarget::File => {
            let dir = Config::get_config_dir()?;
            std::fs::create_dir_all(&dir)?;

            let appender = tracing_appender::rolling::never(&dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;
            Ok(Some(guard))
        }
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))?;
            Ok(None)
        }
    }
}

//! Logging setup: console layer plus an optional daily-rolling file layer.

use std::path::PathBuf;

use anyhow::Result;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log directory; `None` disables file output
    pub log_dir: Option<PathBuf>,
    pub console_enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            console_enabled: true,
        }
    }
}

impl LogConfig {
    pub fn from_server_config(server: &crate::config::ServerConfig) -> Self {
        Self {
            level: server
                .log_level
                .clone()
                .unwrap_or_else(|| "info".to_string()),
            log_dir: server.log_dir.clone(),
            console_enabled: true,
        }
    }
}

/// Initialise the global subscriber. The returned guard must be held for
/// the process lifetime so the non-blocking file writer flushes.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let console_layer = config
        .console_enabled
        .then(|| fmt::layer().with_target(true));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = rolling::daily(dir, "amc-rs.log");
            let (writer, guard) = non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

pub mod config;
pub mod logging_system;

pub use config::{Cli, ConfigError, FileSinkConfig, LoggerConfig, WebhookSinkConfig};
pub use logging_system::{LoggingInitError, LoggingSystem, setup_logging_safe};

use crate::domain::{LogEntry, LogLevel};
use crate::logger::Logger;
use crate::transport::WebhookRegistry;
use clap::Parser;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingInitError),
    #[error("Input error: {0}")]
    Input(#[from] std::io::Error),
}

pub struct App {
    logger: Logger,
    registry: WebhookRegistry,
    line_level: LogLevel,
}

impl App {
    pub fn from_config(config: &LoggerConfig, line_level: LogLevel) -> Result<Self, AppError> {
        let (logger, registry) = config.build()?;
        Ok(Self {
            logger,
            registry,
            line_level,
        })
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn registry(&self) -> &WebhookRegistry {
        &self.registry
    }

    /// Logs every non-empty line from `input`, then flushes all transports.
    /// Returns the number of lines logged.
    pub async fn pump<R>(&self, input: R) -> Result<usize, AppError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut count = 0;
        let result = loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.logger
                        .log_entry(LogEntry::new(self.line_level, line))
                        .await;
                    count += 1;
                }
                Ok(None) => break Ok(count),
                Err(e) => break Err(AppError::Input(e)),
            }
        };
        self.shutdown().await;
        result
    }

    /// Reads stdin until EOF or Ctrl+C.
    pub async fn run(self) -> Result<(), AppError> {
        let stdin = BufReader::new(tokio::io::stdin());

        tokio::select! {
            result = self.pump(stdin) => {
                let count = result?;
                info!("Input closed after {} lines", count);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, flushing transports");
                self.shutdown().await;
            }
        }
        Ok(())
    }

    async fn shutdown(&self) {
        self.logger.flush().await;
        self.registry.flush_all().await;
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    setup_logging_safe(&cli.tracing_filter)?;

    let line_level = cli.line_level;
    let config = cli.into_config().inspect_err(|e| error!("{}", e))?;
    info!(
        "Starting jelly-logger v{} (level={}, webhooks={})",
        get_version(),
        config.level,
        config.webhooks.len()
    );

    App::from_config(&config, line_level)?.run().await
}

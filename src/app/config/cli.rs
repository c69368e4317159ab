use super::{ConfigError, LoggerConfig};
use crate::domain::LogLevel;
use crate::format::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

/// Reads lines from stdin and logs each one through the configured transports.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (TOML)
    #[arg(long, env = "JELLY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Level assigned to every line read from stdin
    #[arg(long, default_value = "info")]
    pub line_level: LogLevel,

    /// Logger threshold, overrides the config file and JELLY_LOG_LEVEL
    #[arg(long)]
    pub level: Option<LogLevel>,

    /// Output format for console and file transports
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Append to this file (rotation settings come from the config file)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Webhook URL, may be repeated
    #[arg(long = "webhook-url")]
    pub webhook_urls: Vec<String>,

    /// Disable the console transport
    #[arg(long)]
    pub no_console: bool,

    /// Filter for the logger's own diagnostics (tracing directive syntax)
    #[arg(long, env = "JELLY_TRACING", default_value = "warn")]
    pub tracing_filter: String,
}

impl Cli {
    /// Merges config file, environment and command line, in that order.
    pub fn into_config(self) -> Result<LoggerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => LoggerConfig::from_file(path)?,
            None => LoggerConfig::default(),
        };
        config.apply_env()?;

        if let Some(level) = self.level {
            config.level = level;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(path) = self.file {
            match &mut config.file {
                Some(file) => file.path = path,
                None => {
                    config.file = Some(super::FileSinkConfig {
                        path,
                        rotation: Default::default(),
                    });
                }
            }
        }
        for url in self.webhook_urls {
            config.add_webhook(url);
        }
        if self.no_console {
            config.console = false;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "jelly-logger",
            "--level",
            "debug",
            "--format",
            "json",
            "--webhook-url",
            "https://a.test/hook",
            "--webhook-url",
            "https://b.test/hook",
            "--no-console",
        ])
        .unwrap();

        assert_eq!(cli.line_level, LogLevel::Info);
        let config = cli.into_config().unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, OutputFormat::Json);
        assert!(!config.console);
        assert_eq!(config.webhooks.len(), 2);
    }

    #[test]
    fn test_cli_rejects_unknown_level() {
        assert!(Cli::try_parse_from(["jelly-logger", "--level", "loud"]).is_err());
    }
}

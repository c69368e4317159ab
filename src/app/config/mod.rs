mod cli;
pub mod serde_helpers;
mod validation;

pub use cli::Cli;

use crate::domain::LogLevel;
use crate::format::OutputFormat;
use crate::logger::Logger;
use crate::redact::{KeyRedactor, RedactionConfig};
use crate::transport::{
    ConsoleTransport, FileTransport, RotationConfig, TransportError, TransportOptions,
    WebhookConfig, WebhookRegistry,
};
use serde::{Deserialize, Serialize};
use serde_helpers::{load_env_list, load_env_path_opt, load_env_var, load_env_var_opt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub rotation: RotationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSinkConfig {
    pub url: String,
    #[serde(flatten)]
    pub config: WebhookConfig,
}

/// Everything needed to assemble a `Logger` and its transports.
///
/// ```toml
/// level = "debug"
/// format = "json"
///
/// [file]
/// path = "/var/log/app.log"
/// rotation = { max_file_size = 10485760, max_files = 5, compress = true }
///
/// [[webhooks]]
/// url = "https://discord.com/api/webhooks/..."
/// batch_interval = 2000
/// max_batch_size = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: LogLevel,
    pub format: OutputFormat,
    pub console: bool,
    pub file: Option<FileSinkConfig>,
    pub webhooks: Vec<WebhookSinkConfig>,
    pub redaction: Option<RedactionConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: OutputFormat::Text,
            console: true,
            file: None,
            webhooks: Vec::new(),
            redaction: None,
        }
    }
}

impl LoggerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: LoggerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Overrides settings from `JELLY_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        load_env_var("JELLY_LOG_LEVEL", &mut self.level)?;
        load_env_var("JELLY_LOG_FORMAT", &mut self.format)?;
        load_env_var("JELLY_CONSOLE", &mut self.console)?;

        let mut file_path = None;
        load_env_path_opt("JELLY_LOG_FILE", &mut file_path);
        if let Some(path) = file_path {
            match &mut self.file {
                Some(file) => file.path = path,
                None => {
                    self.file = Some(FileSinkConfig {
                        path,
                        rotation: RotationConfig::default(),
                    });
                }
            }
        }
        if let Some(file) = &mut self.file {
            load_env_var_opt("JELLY_LOG_MAX_FILE_SIZE", &mut file.rotation.max_file_size)?;
            load_env_var("JELLY_LOG_MAX_FILES", &mut file.rotation.max_files)?;
            load_env_var("JELLY_LOG_COMPRESS", &mut file.rotation.compress)?;
            load_env_var("JELLY_LOG_DATE_ROTATION", &mut file.rotation.date_rotation)?;
        }

        if let Some(urls) = load_env_list("JELLY_WEBHOOK_URL") {
            for url in urls {
                self.add_webhook(url);
            }
        }

        self.validate()
    }

    /// Adds a webhook with default settings unless the URL is already listed.
    pub fn add_webhook(&mut self, url: String) {
        if !self.webhooks.iter().any(|w| w.url == url) {
            self.webhooks.push(WebhookSinkConfig {
                url,
                config: WebhookConfig::default(),
            });
        }
    }

    /// Assembles the logger. The returned registry owns the webhook
    /// transports; flush it (or the logger) before shutdown.
    pub fn build(&self) -> Result<(Logger, WebhookRegistry), ConfigError> {
        let mut options = TransportOptions::default().with_format(self.format);
        if let Some(redaction) = &self.redaction {
            let redactor = KeyRedactor::new(redaction).map_err(|e| {
                ConfigError::InvalidConfig(format!("Invalid redaction pattern: {e}"))
            })?;
            options = options.with_redactor(Arc::new(redactor));
        }

        let mut logger = Logger::new(self.level).with_options(options);
        if self.console {
            logger = logger.with_transport(Arc::new(ConsoleTransport::new()));
        }
        if let Some(file) = &self.file {
            logger = logger.with_transport(Arc::new(FileTransport::new(
                &file.path,
                Some(file.rotation.clone()),
            )));
        }

        let registry = WebhookRegistry::new(WebhookConfig::default())?;
        for webhook in &self.webhooks {
            let transport = registry.get_with(&webhook.url, webhook.config.clone());
            logger = logger.with_transport(Arc::new(transport));
        }

        Ok((logger, registry))
    }
}

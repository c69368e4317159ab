use super::{ConfigError, LoggerConfig};
use url::Url;

impl LoggerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(file) = &self.file {
            if file.path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "File transport path must not be empty".to_string(),
                ));
            }

            if file.rotation.max_file_size == Some(0) {
                return Err(ConfigError::InvalidConfig(
                    "max_file_size must be greater than 0".to_string(),
                ));
            }

            if file.rotation.max_files == 0 {
                return Err(ConfigError::InvalidConfig(
                    "max_files must be greater than 0".to_string(),
                ));
            }
        }

        for webhook in &self.webhooks {
            let url = Url::parse(&webhook.url).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid webhook URL '{}': {}", webhook.url, e))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidUrl(format!(
                    "Webhook URL '{}' must use http or https",
                    webhook.url
                )));
            }

            if webhook.config.max_batch_size == 0 {
                return Err(ConfigError::InvalidConfig(
                    "Webhook max_batch_size must be greater than 0".to_string(),
                ));
            }

            if webhook.config.batch_interval.is_zero() {
                return Err(ConfigError::InvalidConfig(
                    "Webhook batch_interval must be greater than 0".to_string(),
                ));
            }
        }

        if let Some(redaction) = &self.redaction {
            for pattern in &redaction.patterns {
                regex::Regex::new(pattern).map_err(|e| {
                    ConfigError::InvalidConfig(format!("Invalid redaction pattern '{pattern}': {e}"))
                })?;
            }
        }

        Ok(())
    }
}

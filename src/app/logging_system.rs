use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingInitError {
    #[error("Invalid tracing filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("Failed to set global tracing subscriber: {0}")]
    AlreadySet(String),
}

/// Filter directives for the logger's own diagnostics.
pub struct LoggingSystem {
    directives: Vec<String>,
}

impl LoggingSystem {
    pub fn new() -> Self {
        Self {
            directives: Vec::new(),
        }
    }

    pub fn add_directive(&mut self, directive: &str) {
        let directive = directive.trim();
        if !directive.is_empty() {
            self.directives.push(directive.to_string());
        }
    }

    /// HTTP stack crates are chatty at debug level.
    pub fn add_default_directives(&mut self) {
        for target in ["hyper", "hyper_util", "reqwest", "h2", "rustls"] {
            self.directives.push(format!("{target}=warn"));
        }
    }

    pub fn build_filter_string(&self, default_filter: &str) -> String {
        let mut parts = Vec::with_capacity(self.directives.len() + 1);
        parts.push(default_filter.to_string());
        parts.extend(self.directives.iter().cloned());
        parts.join(",")
    }

    pub fn directive_count(&self) -> usize {
        self.directives.len()
    }

    pub fn initialize_tracing(&self, default_filter: &str) -> Result<(), LoggingInitError> {
        let filter = self.build_filter_string(default_filter);
        let env_filter =
            EnvFilter::try_new(&filter).map_err(|source| LoggingInitError::InvalidFilter {
                filter: filter.clone(),
                source,
            })?;

        // Diagnostics go to stderr so they never mix with console transport output on stdout.
        let subscriber = tracing_subscriber::registry().with(env_filter).with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .compact(),
        );

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| LoggingInitError::AlreadySet(e.to_string()))
    }
}

impl Default for LoggingSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the global subscriber once; later calls return the first outcome.
pub fn setup_logging_safe(default_filter: &str) -> Result<(), LoggingInitError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    let outcome = INIT.get_or_init(|| {
        let mut logging_system = LoggingSystem::new();
        logging_system.add_default_directives();
        logging_system
            .initialize_tracing(default_filter)
            .map_err(|e| e.to_string())
    });

    outcome.clone().map_err(LoggingInitError::AlreadySet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_directive_skips_blank() {
        let mut logging_system = LoggingSystem::new();
        logging_system.add_directive("jelly_logger=debug");
        logging_system.add_directive("   ");
        assert_eq!(logging_system.directive_count(), 1);
    }

    #[test]
    fn test_build_filter_string() {
        let mut logging_system = LoggingSystem::new();
        assert_eq!(logging_system.build_filter_string("info"), "info");

        logging_system.add_default_directives();
        let filter = logging_system.build_filter_string("debug");
        assert!(filter.starts_with("debug,"));
        assert!(filter.contains("hyper=warn"));
        assert!(filter.contains("reqwest=warn"));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let logging_system = LoggingSystem::new();
        let result = logging_system.initialize_tracing("jelly_logger=notalevel");
        assert!(matches!(result, Err(LoggingInitError::InvalidFilter { .. })));
    }
}

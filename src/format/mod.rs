//! Line renderers shared by the transports.
//!
//! A `Formatter` may fail; callers always fall back to one of the built-in
//! renderers so an entry is never lost because of a broken formatter.

use crate::domain::LogEntry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Formatter failed: {0}")]
    Failed(String),
    #[error("JSON rendering failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output shape selected when no custom formatter is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}' (expected text or json)")),
        }
    }
}

pub trait Formatter: Send + Sync {
    fn format(&self, entry: &LogEntry) -> Result<String, FormatError>;
}

impl<F> Formatter for F
where
    F: Fn(&LogEntry) -> Result<String, FormatError> + Send + Sync,
{
    fn format(&self, entry: &LogEntry) -> Result<String, FormatError> {
        self(entry)
    }
}

/// `[timestamp] LEVEL: message args {data}`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl DefaultFormatter {
    pub fn render(entry: &LogEntry) -> String {
        let mut line = format!(
            "[{}] {}: {}",
            entry.timestamp, entry.level_name, entry.message
        );
        for arg in &entry.args {
            line.push(' ');
            line.push_str(arg);
        }
        if let Some(data) = entry.data.as_ref().filter(|data| !data.is_empty()) {
            // BTreeMap<String, Value> always serializes
            if let Ok(json) = serde_json::to_string(data) {
                line.push(' ');
                line.push_str(&json);
            }
        }
        line
    }
}

impl Formatter for DefaultFormatter {
    fn format(&self, entry: &LogEntry) -> Result<String, FormatError> {
        Ok(Self::render(entry))
    }
}

/// One compact JSON object per entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, entry: &LogEntry) -> Result<String, FormatError> {
        Ok(serde_json::to_string(entry)?)
    }
}

/// Renders a line in the requested built-in format, degrading to text.
pub fn render_builtin(entry: &LogEntry, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => match JsonFormatter.format(entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("JSON rendering failed, using text format: {}", e);
                DefaultFormatter::render(entry)
            }
        },
        OutputFormat::Text => DefaultFormatter::render(entry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;

    fn entry() -> LogEntry {
        LogEntry::new(LogLevel::Error, "request failed")
            .with_timestamp("2024-05-01T12:00:00.000Z")
            .with_args(["503", "\"upstream\""])
    }

    #[test]
    fn test_default_render() {
        assert_eq!(
            DefaultFormatter::render(&entry()),
            "[2024-05-01T12:00:00.000Z] ERROR: request failed 503 \"upstream\""
        );
    }

    #[test]
    fn test_default_render_appends_data() {
        let line = DefaultFormatter::render(&entry().with_field("id", 7));
        assert!(line.ends_with(" {\"id\":7}"));
    }

    #[test]
    fn test_json_render_is_single_line() {
        let line = render_builtin(&entry(), OutputFormat::Json);
        assert!(!line.contains('\n'));
        let parsed: LogEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, entry());
    }

    #[test]
    fn test_closure_formatter() {
        let formatter = |e: &LogEntry| -> Result<String, FormatError> { Ok(e.message.to_uppercase()) };
        assert_eq!(formatter.format(&entry()).unwrap(), "REQUEST FAILED");
    }
}

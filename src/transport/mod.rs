//! Transport contract and the sinks that implement it.

pub mod console;
pub mod error;
pub mod file;
pub mod webhook;

pub use console::ConsoleTransport;
pub use error::{RotationStage, TransportError};
pub use file::{FileSystem, FileTransport, RotationConfig, TokioFileSystem};
pub use webhook::{WebhookConfig, WebhookRegistry, WebhookTransport};

use crate::domain::LogEntry;
use crate::format::{Formatter, OutputFormat};
use crate::redact::{RedactionTarget, Redactor};
use async_trait::async_trait;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Side channel for failures that transports swallow.
pub type ErrorReporter = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// A log destination.
///
/// `log` never fails from the caller's point of view: write, delivery and
/// formatting problems are reported through the transport's own channel.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn log(&self, entry: &LogEntry, options: &TransportOptions);

    async fn flush(&self, _options: &TransportOptions) {}
}

/// Per-call rendering options handed to every transport.
#[derive(Clone, Default)]
pub struct TransportOptions {
    pub format: OutputFormat,
    /// Takes precedence over everything else.
    pub formatter: Option<Arc<dyn Formatter>>,
    pub custom_formatter: Option<Arc<dyn Formatter>>,
    pub redactor: Option<Arc<dyn Redactor>>,
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("format", &self.format)
            .field("formatter", &self.formatter.is_some())
            .field("custom_formatter", &self.custom_formatter.is_some())
            .field("redactor", &self.redactor.is_some())
            .finish()
    }
}

impl TransportOptions {
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_custom_formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.custom_formatter = Some(formatter);
        self
    }

    pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = Some(redactor);
        self
    }

    pub fn redact<'a>(&self, entry: &'a LogEntry, target: RedactionTarget) -> Cow<'a, LogEntry> {
        match &self.redactor {
            Some(redactor) => redactor.apply(entry, target),
            None => Cow::Borrowed(entry),
        }
    }

    /// Output of the pluggable or custom formatter, if one is set and succeeds.
    ///
    /// A failing formatter is reported and skipped for this entry only.
    pub fn custom_line(
        &self,
        entry: &LogEntry,
        reporter: Option<&ErrorReporter>,
    ) -> Option<String> {
        for formatter in [&self.formatter, &self.custom_formatter].into_iter().flatten() {
            match formatter.format(entry) {
                Ok(line) => return Some(line),
                Err(e) => report(reporter, TransportError::Format(e), false),
            }
        }
        None
    }
}

pub(crate) fn report(reporter: Option<&ErrorReporter>, error: TransportError, quiet: bool) {
    if !quiet {
        match &error {
            TransportError::Format(_) => tracing::warn!("Falling back to default format: {}", error),
            _ => tracing::error!("{}", error),
        }
    }
    if let Some(reporter) = reporter {
        reporter(&error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogLevel;
    use crate::format::FormatError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failing() -> Arc<dyn Formatter> {
        Arc::new(|_: &LogEntry| -> Result<String, FormatError> {
            Err(FormatError::Failed("boom".to_string()))
        })
    }

    fn upper() -> Arc<dyn Formatter> {
        Arc::new(|e: &LogEntry| -> Result<String, FormatError> { Ok(e.message.to_uppercase()) })
    }

    #[test]
    fn test_pluggable_formatter_wins() {
        let options = TransportOptions::default()
            .with_formatter(upper())
            .with_custom_formatter(failing());
        let entry = LogEntry::new(LogLevel::Info, "hello");
        assert_eq!(options.custom_line(&entry, None).as_deref(), Some("HELLO"));
    }

    #[test]
    fn test_failing_formatter_is_reported_and_skipped() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let reporter: ErrorReporter = Arc::new(move |err| {
            assert!(matches!(err, TransportError::Format(_)));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let options = TransportOptions::default().with_custom_formatter(failing());
        let entry = LogEntry::new(LogLevel::Info, "hello");

        assert_eq!(options.custom_line(&entry, Some(&reporter)), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

use super::{ErrorReporter, Transport, TransportOptions};
use crate::domain::{LogEntry, LogLevel};
use crate::format::render_builtin;
use crate::redact::RedactionTarget;
use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, stderr, stdout};

/// Writes rendered lines to stdout, or stderr for `Error` and `Fatal`.
#[derive(Clone, Default)]
pub struct ConsoleTransport {
    reporter: Option<ErrorReporter>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    fn uses_stderr(level: LogLevel) -> bool {
        level <= LogLevel::Error
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn log(&self, entry: &LogEntry, options: &TransportOptions) {
        let entry = options.redact(entry, RedactionTarget::Console);
        let mut line = options
            .custom_line(&entry, self.reporter.as_ref())
            .unwrap_or_else(|| render_builtin(&entry, options.format));
        line.push('\n');

        // Console output is best effort; a closed pipe is not worth reporting.
        let _ = if Self::uses_stderr(entry.level) {
            stderr().write_all(line.as_bytes()).await
        } else {
            stdout().write_all(line.as_bytes()).await
        };
    }

    async fn flush(&self, _options: &TransportOptions) {
        let _ = stdout().flush().await;
        let _ = stderr().flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severe_levels_go_to_stderr() {
        assert!(ConsoleTransport::uses_stderr(LogLevel::Fatal));
        assert!(ConsoleTransport::uses_stderr(LogLevel::Error));
        assert!(!ConsoleTransport::uses_stderr(LogLevel::Warn));
        assert!(!ConsoleTransport::uses_stderr(LogLevel::Trace));
    }
}

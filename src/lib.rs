#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_possible_truncation, // Millisecond durations fit in u64
    clippy::cast_precision_loss,      // Retry-After seconds are small
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::doc_markdown
)]

pub mod app;
pub mod domain;
pub mod format;
pub mod logger;
pub mod redact;
pub mod transport;

pub use app::{App, LoggerConfig};
pub use domain::{LogEntry, LogLevel};
pub use format::{DefaultFormatter, FormatError, Formatter, JsonFormatter, OutputFormat};
pub use logger::Logger;
pub use redact::{KeyRedactor, RedactionConfig, RedactionTarget, Redactor};
pub use transport::{
    ConsoleTransport, ErrorReporter, FileTransport, RotationConfig, Transport, TransportError,
    TransportOptions, WebhookConfig, WebhookRegistry, WebhookTransport,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

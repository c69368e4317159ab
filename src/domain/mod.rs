//! Domain layer for jelly-logger.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEntry`: The record every transport receives
//! - `LogLevel`: Numeric severity (0 = silent .. 6 = trace)

pub mod log_entry;
pub mod log_level;

pub use log_entry::LogEntry;
pub use log_level::{LogLevel, ParseLevelError};

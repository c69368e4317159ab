use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Severity of a log entry.
///
/// Lower numeric codes are more severe. A logger threshold admits every level
/// whose code is less than or equal to the threshold, and `Silent` admits
/// nothing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Silent = 0,
    Fatal = 1,
    Error = 2,
    Warn = 3,
    #[default]
    Info = 4,
    Debug = 5,
    Trace = 6,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown log level: {0}")]
pub struct ParseLevelError(pub String);

impl LogLevel {
    pub const ALL: [LogLevel; 7] = [
        LogLevel::Silent,
        LogLevel::Fatal,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Silent => "SILENT",
            LogLevel::Fatal => "FATAL",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Whether an entry at `level` passes a threshold of `self`.
    pub fn admits(self, level: LogLevel) -> bool {
        self != LogLevel::Silent && level != LogLevel::Silent && level <= self
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| ParseLevelError(s.to_string()));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseLevelError(s.to_string()))
    }
}

/// Serializes a level as its numeric code, the shape used inside log records.
pub mod as_code {
    use super::LogLevel;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(level: &LogLevel, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(level.code())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        LogLevel::from_code(code).ok_or_else(|| D::Error::custom(format!("invalid level {code}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_admits_more_severe_levels() {
        assert!(LogLevel::Warn.admits(LogLevel::Error));
        assert!(LogLevel::Warn.admits(LogLevel::Warn));
        assert!(!LogLevel::Warn.admits(LogLevel::Info));
        assert!(!LogLevel::Silent.admits(LogLevel::Fatal));
        assert!(!LogLevel::Trace.admits(LogLevel::Silent));
    }

    #[test]
    fn test_parse_names_and_codes() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" WARN ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("1".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert!("7".parse::<LogLevel>().is_err());
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_code_round_trip() {
        for level in LogLevel::ALL {
            assert_eq!(LogLevel::from_code(level.code()), Some(level));
        }
    }
}

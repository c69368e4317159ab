use crate::format::FormatError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Housekeeping step that failed during a file rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStage {
    Drain,
    Probe,
    RemoveOldest,
    Shift,
    Compress,
    Move,
    Reopen,
}

impl fmt::Display for RotationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RotationStage::Drain => "drain",
            RotationStage::Probe => "probe",
            RotationStage::RemoveOldest => "remove-oldest",
            RotationStage::Shift => "shift",
            RotationStage::Compress => "compress",
            RotationStage::Move => "move",
            RotationStage::Reopen => "reopen",
        };
        f.write_str(name)
    }
}

/// Failures observed inside a transport.
///
/// None of these ever reach the caller of `Transport::log`; they are handed
/// to the transport's `ErrorReporter` and to `tracing`.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Write to {path} failed: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Rotation step '{stage}' failed for {path}: {source}")]
    Rotation {
        stage: RotationStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Formatter error: {0}")]
    Format(#[from] FormatError),
    #[error("Webhook responded with HTTP {status}: {body}")]
    Delivery { status: u16, body: String },
    #[error("Webhook rate limited, waited {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("Webhook request timed out: {0}")]
    Timeout(String),
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Dropped batch {batch_id} ({entries} entries) after {attempts} attempts")]
    RetriesExhausted {
        batch_id: String,
        entries: usize,
        attempts: u32,
    },
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl TransportError {
    /// Whether the webhook retry state machine should try the batch again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Delivery { .. }
                | TransportError::RateLimited { .. }
                | TransportError::Timeout(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TransportError::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(
            TransportError::Delivery {
                status: 500,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            TransportError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(!TransportError::Network("refused".to_string()).is_retryable());
    }

    #[test]
    fn test_rotation_message_names_stage() {
        let err = TransportError::Rotation {
            stage: RotationStage::Shift,
            path: PathBuf::from("app.2.log"),
            source: std::io::Error::other("busy"),
        };
        assert_eq!(
            err.to_string(),
            "Rotation step 'shift' failed for app.2.log: busy"
        );
    }
}

//! Error types for the liveness registry
//!
//! Store-connectivity failures are kept apart from every other failure so that
//! callers never mistake an unreachable store for an empty registry.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the registry and its store adapters
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Shared Store Errors
    // =========================================================================
    #[error("Shared store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Shared store rejected command ({kind}): {reason}")]
    StoreCommand { kind: String, reason: String },

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Invalid heartbeat for node {node_id}: {value:?}")]
    InvalidHeartbeat { node_id: String, value: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<fred::error::Error> for Error {
    fn from(err: fred::error::Error) -> Self {
        use fred::error::ErrorKind;

        match err.kind() {
            ErrorKind::IO
            | ErrorKind::Timeout
            | ErrorKind::Canceled
            | ErrorKind::Backpressure
            | ErrorKind::Routing
            | ErrorKind::Cluster
            | ErrorKind::Tls => Error::StoreUnavailable(err.details().to_string()),
            ErrorKind::Auth | ErrorKind::Config | ErrorKind::Url => {
                Error::Configuration(format!("store rejected connection: {}", err.details()))
            }
            kind => Error::StoreCommand {
                kind: format!("{:?}", kind),
                reason: err.details().to_string(),
            },
        }
    }
}

/// Action a caller should take after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Retry after a specific duration
    RetryAfter(Duration),
    /// Do not retry, the input or setup must change
    Fail,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::StoreUnavailable(_) | Error::Io(_) => ErrorAction::RetryWithBackoff,

            // The server rejected the command; give it a moment
            Error::StoreCommand { .. } => ErrorAction::RetryAfter(Duration::from_secs(5)),

            // Bad data or configuration - don't retry automatically
            Error::Configuration(_)
            | Error::InvalidHeartbeat { .. }
            | Error::YamlParse(_)
            | Error::JsonParse(_) => ErrorAction::Fail,

            Error::Internal(_) => ErrorAction::RetryWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::Fail)
    }

    /// Check if this error means the shared store could not be reached
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::Io(_))
    }
}

/// Result type alias for the registry
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::StoreUnavailable("connection refused".into());
        assert_eq!(err.action(), ErrorAction::RetryWithBackoff);

        let err = Error::Configuration("ttl must be positive".into());
        assert_eq!(err.action(), ErrorAction::Fail);

        let err = Error::StoreCommand {
            kind: "InvalidArgument".into(),
            reason: "WRONGTYPE Operation against a key holding the wrong kind of value".into(),
        };
        assert_eq!(err.action(), ErrorAction::RetryAfter(Duration::from_secs(5)));
    }

    #[test]
    fn test_error_retryable() {
        let transient = Error::StoreUnavailable("timeout".into());
        assert!(transient.is_retryable());
        assert!(transient.is_transient());

        let bad = Error::InvalidHeartbeat {
            node_id: "node-1".into(),
            value: "yesterday".into(),
        };
        assert!(!bad.is_retryable());
        assert!(!bad.is_transient());
    }

    #[test]
    fn test_fred_io_error_is_unavailable() {
        let err: Error =
            fred::error::Error::new(fred::error::ErrorKind::IO, "connection reset").into();
        assert!(err.is_transient());

        let err: Error =
            fred::error::Error::new(fred::error::ErrorKind::InvalidCommand, "unknown command")
                .into();
        assert!(matches!(err, Error::StoreCommand { .. }));
    }
}

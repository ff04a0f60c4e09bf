//! # Pipeline Error Types
//!
//! Structured error handling for the operation pipeline using thiserror.
//!
//! Every failure that crosses an operation boundary is a [`PipelineError`].
//! Errors are grouped into four [`ErrorCategory`] buckets, and the retry engine
//! only ever reschedules errors in [`ErrorCategory::Transient`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for retry decisions and caller-facing handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A precondition was not met; the operation body never ran
    ConditionFailure,
    /// Timeout, connectivity loss or server-side failure; may succeed on retry
    Transient,
    /// Authorization, validation or business-rule rejection; never retried
    Terminal,
    /// The operation was abandoned; not a failure
    Cancelled,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::ConditionFailure => write!(f, "condition_failure"),
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Terminal => write!(f, "terminal"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Condition '{condition}' failed: {reason}")]
    ConditionFailed { condition: String, reason: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Timeout: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Authorization failed: {message}")]
    Authorization { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Request rejected: {message}")]
    Rejected { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("No push registration available")]
    NoRegistration,

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Service '{service}' is not running")]
    NotRunning { service: String },

    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn condition_failed(condition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConditionFailed {
            condition: condition.into(),
            reason: reason.into(),
        }
    }

    pub fn not_running(service: impl Into<String>) -> Self {
        Self::NotRunning {
            service: service.into(),
        }
    }

    /// Classify the error into one of the pipeline's error categories
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConditionFailed { .. } => ErrorCategory::ConditionFailure,
            Self::Network { .. } | Self::Timeout { .. } => ErrorCategory::Transient,
            Self::Server { status, .. } => match status {
                408 | 429 | 500..=599 => ErrorCategory::Transient,
                _ => ErrorCategory::Terminal,
            },
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Authorization { .. }
            | Self::Validation { .. }
            | Self::Rejected { .. }
            | Self::Decode { .. }
            | Self::NoRegistration
            | Self::Storage { .. }
            | Self::NotRunning { .. }
            | Self::InvalidTransition { .. }
            | Self::Configuration(_)
            | Self::Internal(_) => ErrorCategory::Terminal,
        }
    }

    /// Pure retry classifier: true only for transient failures
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Map an HTTP status code returned by the backend to a pipeline error
pub fn classify_http_status(status: u16, message: impl Into<String>) -> PipelineError {
    let message = message.into();
    match status {
        401 | 403 => PipelineError::Authorization { message },
        400 | 422 => PipelineError::Validation { message },
        408 | 429 | 500..=599 => PipelineError::Server { status, message },
        _ => PipelineError::Rejected {
            message: format!("HTTP {status}: {message}"),
        },
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::Decode {
            message: error.to_string(),
        }
    }
}

impl From<crate::config::ConfigurationError> for PipelineError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        PipelineError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(PipelineError::network("connection reset").is_retryable());
        assert!(PipelineError::Timeout {
            operation: "sync".to_string(),
            timeout_ms: 1000
        }
        .is_retryable());
        assert!(classify_http_status(503, "unavailable").is_retryable());
        assert!(classify_http_status(429, "slow down").is_retryable());
    }

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        assert!(!classify_http_status(401, "bad token").is_retryable());
        assert!(!classify_http_status(400, "malformed").is_retryable());
        assert!(!classify_http_status(404, "missing").is_retryable());
        assert!(!PipelineError::NoRegistration.is_retryable());
    }

    #[test]
    fn test_condition_and_cancel_categories() {
        let err = PipelineError::condition_failed("healthy_registration", "no registration");
        assert_eq!(err.category(), ErrorCategory::ConditionFailure);
        assert!(!err.is_retryable());
        assert_eq!(PipelineError::Cancelled.category(), ErrorCategory::Cancelled);
    }

    #[test]
    fn test_http_status_mapping() {
        assert!(matches!(
            classify_http_status(403, "nope"),
            PipelineError::Authorization { .. }
        ));
        assert!(matches!(
            classify_http_status(502, "gateway"),
            PipelineError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify_http_status(409, "conflict"),
            PipelineError::Rejected { .. }
        ));
    }
}

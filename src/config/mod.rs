//! # Configuration
//!
//! Typed configuration for the operation pipeline and the message handler.
//!
//! Defaults mirror the constants the messaging SDK has always shipped with, so
//! an embedding application can run with `PipelineConfig::default()` and only
//! override what it needs through YAML (see [`loader::ConfigManager`]).
//!
//! ```rust
//! use courier_core::config::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! assert_eq!(config.retry.default_retry_limit, 3);
//! assert_eq!(config.queues.sync.max_concurrent, 1);
//! config.validate().unwrap();
//! ```

pub mod loader;

pub use loader::ConfigManager;

use crate::operation::{QueuePriority, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration file not found. Searched paths: {searched_paths:?}")]
    ConfigFileNotFound { searched_paths: Vec<PathBuf> },

    #[error("Invalid YAML in configuration file '{file_path}': {error}")]
    InvalidYaml { file_path: String, error: String },

    #[error("Failed to read configuration file '{file_path}': {error}")]
    FileReadError { file_path: String, error: String },

    #[error("Configuration file '{file_path}' is {size} bytes, limit is {limit} bytes")]
    FileTooLarge {
        file_path: String,
        size: u64,
        limit: u64,
    },

    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn invalid_yaml(file_path: impl Into<String>, error: impl ToString) -> Self {
        Self::InvalidYaml {
            file_path: file_path.into(),
            error: error.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

/// Root configuration for the pipeline
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retry and backoff behaviour for retryable operations
    pub retry: RetryConfig,

    /// Per-queue concurrency settings owned by the message handler
    pub queues: QueuesConfig,

    /// Message lifecycle tuning (debounce, eviction, fetch limits)
    pub messages: MessagesConfig,

    /// Logging output settings
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retry.backoff_unit_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.backoff_unit_ms",
                self.retry.backoff_unit_ms,
                "backoff unit must be positive",
            ));
        }

        for (name, settings) in [
            ("handling", &self.queues.handling),
            ("sending", &self.queues.sending),
            ("sync", &self.queues.sync),
            ("request", &self.queues.request),
        ] {
            if settings.max_concurrent == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("queues.{name}.max_concurrent"),
                    settings.max_concurrent,
                    "a queue needs at least one execution slot",
                ));
            }
        }

        if self.messages.fetch_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "messages.fetch_limit",
                self.messages.fetch_limit,
                "fetch limit must be positive",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry limit used for requests that do not specify their own
    pub default_retry_limit: u32,
    /// Unit of the quadratic backoff: delay = unit * retry_number^2
    pub backoff_unit_ms: u64,
    /// How long a retry waits for connectivity before giving up
    pub reachability_timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            default_retry_limit: 3,
            backoff_unit_ms: 1000,
            reachability_timeout_seconds: 60,
        }
    }
}

impl RetryConfig {
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_secs(self.reachability_timeout_seconds)
    }

    /// Build the retry policy for an operation with the given retry limit
    pub fn policy(&self, retry_limit: u32) -> RetryPolicy {
        RetryPolicy::new(retry_limit)
            .with_backoff_unit(self.backoff_unit())
            .with_reachability_timeout(self.reachability_timeout())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    pub priority: QueuePriority,
}

impl QueueSettings {
    pub fn serial() -> Self {
        Self {
            max_concurrent: 1,
            priority: QueuePriority::Default,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::serial()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub handling: QueueSettings,
    pub sending: QueueSettings,
    pub sync: QueueSettings,
    pub request: QueueSettings,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            handling: QueueSettings::serial(),
            sending: QueueSettings {
                max_concurrent: 1,
                priority: QueuePriority::UserInitiated,
            },
            sync: QueueSettings::serial(),
            request: QueueSettings {
                max_concurrent: 4,
                priority: QueuePriority::Default,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Quiet period before a postponed seen report is sent
    pub seen_debounce_ms: u64,
    /// Age after which persisted messages are evicted at service start
    pub message_max_age_seconds: u64,
    /// Incoming messages older than this are ignored by message handling
    pub retention_period_seconds: u64,
    /// Window of delivery-reported messages reported back as the archive
    pub archive_length_days: i64,
    /// Maximum number of archive message ids sent with a sync request
    pub fetch_limit: usize,
    /// Fetch may trigger handling which may trigger fetch; this bounds the chain
    pub fetch_iteration_limit: u32,
}

const WEEK_SECONDS: u64 = 7 * 24 * 60 * 60;

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            seen_debounce_ms: 1000,
            message_max_age_seconds: WEEK_SECONDS,
            retention_period_seconds: WEEK_SECONDS,
            archive_length_days: 7,
            fetch_limit: 100,
            fetch_iteration_limit: 2,
        }
    }
}

impl MessagesConfig {
    pub fn seen_debounce(&self) -> Duration {
        Duration::from_millis(self.seen_debounce_ms)
    }

    pub fn message_max_age(&self) -> Duration {
        Duration::from_secs(self.message_max_age_seconds)
    }

    pub fn retention_period(&self) -> Duration {
        Duration::from_secs(self.retention_period_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; falls back to the environment default
    pub level: Option<String>,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queues.request.max_concurrent, 4);
        assert_eq!(config.queues.sending.priority, QueuePriority::UserInitiated);
        assert_eq!(config.messages.fetch_iteration_limit, 2);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let mut config = PipelineConfig::default();
        config.queues.sync.max_concurrent = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queues.sync.max_concurrent"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = RetryConfig {
            default_retry_limit: 2,
            backoff_unit_ms: 10,
            reachability_timeout_seconds: 5,
        };
        let policy = config.policy(4);
        assert_eq!(policy.retry_limit(), 4);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(90));
        assert_eq!(policy.reachability_timeout(), Some(Duration::from_secs(5)));
    }
}

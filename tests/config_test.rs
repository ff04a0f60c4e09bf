//! Configuration loading from a directory

use courier_core::config::{ConfigManager, ConfigurationError, PipelineConfig};
use courier_core::operation::QueuePriority;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const CONFIG: &str = r#"
retry:
  default_retry_limit: 4
  backoff_unit_ms: 250
queues:
  request:
    max_concurrent: 8
  sending:
    priority: user_initiated
messages:
  seen_debounce_ms: 1500
  fetch_limit: 50
test:
  retry:
    backoff_unit_ms: 1
  messages:
    seen_debounce_ms: 10
production:
  logging:
    json: true
    level: info
"#;

fn write_config(content: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("courier.yaml"), content).unwrap();
    dir
}

#[test]
fn test_load_applies_environment_section() {
    let dir = write_config(CONFIG);
    let manager = ConfigManager::load_from_directory_with_env(dir.path().to_path_buf(), "test").unwrap();
    let config = manager.config();

    assert_eq!(manager.environment(), "test");
    assert_eq!(config.retry.default_retry_limit, 4);
    assert_eq!(config.retry.backoff_unit(), Duration::from_millis(1));
    assert_eq!(config.messages.seen_debounce(), Duration::from_millis(10));
    assert_eq!(config.messages.fetch_limit, 50);
    assert_eq!(config.queues.request.max_concurrent, 8);
    assert_eq!(config.queues.sending.priority, QueuePriority::UserInitiated);
    // untouched values keep their defaults
    assert_eq!(config.queues.sync.max_concurrent, 1);
    assert_eq!(config.messages.fetch_iteration_limit, 2);
}

#[test]
fn test_production_section() {
    let dir = write_config(CONFIG);
    let manager =
        ConfigManager::load_from_directory_with_env(dir.path().to_path_buf(), "production").unwrap();
    let config = manager.config();

    assert!(config.logging.json);
    assert_eq!(config.logging.level.as_deref(), Some("info"));
    assert_eq!(config.retry.backoff_unit_ms, 250);
}

#[test]
fn test_retry_policy_from_config() {
    let dir = write_config(CONFIG);
    let manager = ConfigManager::load_from_directory_with_env(dir.path().to_path_buf(), "development").unwrap();
    let policy = manager.config().retry.policy(2);

    assert_eq!(policy.retry_limit(), 2);
    assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
    assert_eq!(policy.reachability_timeout(), Some(Duration::from_secs(60)));
}

#[test]
fn test_missing_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = ConfigManager::load_from_directory_with_env(dir.path().to_path_buf(), "test").unwrap_err();
    assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
}

#[test]
fn test_invalid_values_fail_validation() {
    let dir = write_config("queues:\n  sync:\n    max_concurrent: 0\n");
    let err = ConfigManager::load_from_directory_with_env(dir.path().to_path_buf(), "test").unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[test]
fn test_defaults_are_valid() {
    let config = PipelineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.retry.reachability_timeout(), Duration::from_secs(60));
    assert_eq!(config.messages.message_max_age(), Duration::from_secs(7 * 24 * 60 * 60));
}

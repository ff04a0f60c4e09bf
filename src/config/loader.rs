//! Configuration Loader
//!
//! Environment-aware configuration loading. A single `courier.yaml` holds the
//! base values plus optional `development`, `test` and `production` sections;
//! the section matching the active environment is deep-merged over the base.

use super::{ConfigResult, ConfigurationError, PipelineConfig};
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "courier.yaml";
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration together with the environment it was resolved for
#[derive(Debug)]
pub struct ConfigManager {
    config: PipelineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration from `./config` with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(PathBuf::from("config"))
    }

    pub fn load_from_directory(config_dir: PathBuf) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment; tests use this instead of mutating env vars
    pub fn load_from_directory_with_env(
        config_dir: PathBuf,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        debug!(
            environment = %environment,
            directory = %config_dir.display(),
            "Loading pipeline configuration"
        );

        let config_file = config_dir.join(CONFIG_FILE_NAME);
        if !config_file.exists() {
            return Err(ConfigurationError::ConfigFileNotFound {
                searched_paths: vec![config_file],
            });
        }

        let content = Self::read_config_file_safely(&config_file)?;
        let config = Self::parse_with_environment(
            &content,
            environment,
            &config_file.display().to_string(),
        )?;
        config.validate()?;

        info!(
            environment = %environment,
            retry_limit = config.retry.default_retry_limit,
            seen_debounce_ms = config.messages.seen_debounce_ms,
            "Pipeline configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: config_dir,
        }))
    }

    /// Parse YAML content and apply the section for `environment`
    pub fn parse_with_environment(
        content: &str,
        environment: &str,
        source: &str,
    ) -> ConfigResult<PipelineConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(content)
            .map_err(|e| ConfigurationError::invalid_yaml(source, e))?;

        if yaml_data.is_null() {
            return Ok(PipelineConfig::default());
        }

        if let Some(overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(environment = %environment, "Applying environment-specific overrides");
            merge_yaml_values(&mut yaml_data, overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                source,
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("COURIER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let file_path = path.display().to_string();
        let metadata = std::fs::metadata(path).map_err(|e| ConfigurationError::FileReadError {
            file_path: file_path.clone(),
            error: e.to_string(),
        })?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::FileTooLarge {
                file_path,
                size: metadata.len(),
                limit: MAX_CONFIG_FILE_SIZE,
            });
        }

        std::fs::read_to_string(path).map_err(|e| ConfigurationError::FileReadError {
            file_path,
            error: e.to_string(),
        })
    }
}

/// Recursively merge YAML values (environment overrides into base config)
fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
    match (&mut *base, override_value) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
            for (key, value) in override_map {
                if let Some(existing) = base_map.get_mut(&key) {
                    merge_yaml_values(existing, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_ref, override_val) => {
            *base_ref = override_val;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
retry:
  default_retry_limit: 5
  backoff_unit_ms: 500
messages:
  seen_debounce_ms: 2000
test:
  retry:
    backoff_unit_ms: 1
  messages:
    seen_debounce_ms: 50
production:
  logging:
    json: true
"#;

    #[test]
    fn test_environment_section_overrides_base() {
        let config = ConfigManager::parse_with_environment(SAMPLE, "test", "inline").unwrap();
        assert_eq!(config.retry.default_retry_limit, 5);
        assert_eq!(config.retry.backoff_unit_ms, 1);
        assert_eq!(config.messages.seen_debounce_ms, 50);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_unknown_environment_uses_base() {
        let config =
            ConfigManager::parse_with_environment(SAMPLE, "staging", "inline").unwrap();
        assert_eq!(config.retry.backoff_unit_ms, 500);
        assert_eq!(config.messages.seen_debounce_ms, 2000);
        // untouched sections keep defaults
        assert_eq!(config.messages.fetch_limit, 100);
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = ConfigManager::parse_with_environment("", "test", "inline").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        let err = ConfigManager::parse_with_environment("retry: [unclosed", "test", "inline")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidYaml { .. }));
    }
}

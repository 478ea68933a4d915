//! Application configuration.
//!
//! Aggregates configuration for the catalog client, authentication,
//! validation polling and conflict handling into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod sections;

pub use sections::{
    AuthConfig, CatalogConfig, ConflictConfig, ValidationConfig, DEFAULT_CATALOG_ENDPOINT,
    DEFAULT_IAM_ENDPOINT,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "catver.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CATVER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "CATVER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "CATVER_LOG";
/// Environment variable holding the IAM API key when the config has none.
pub const API_KEY_ENV_VAR: &str = "CATVER_API_KEY";

use serde::Deserialize;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog service endpoint configuration.
    pub catalog: CatalogConfig,
    /// IAM authentication configuration.
    pub auth: AuthConfig,
    /// Validation polling configuration.
    pub validation: ValidationConfig,
    /// Optimistic-concurrency conflict handling.
    pub conflict: ConflictConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `catver.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        if config.auth.api_key.is_none() {
            config.auth.api_key = std::env::var(API_KEY_ENV_VAR).ok();
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("catalog.endpoint is empty".to_string()));
        }
        if self.auth.iam_endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("auth.iam_endpoint is empty".to_string()));
        }
        if self.validation.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "validation.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.conflict.min_delay_ms > self.conflict.max_delay_ms {
            return Err(ConfigError::Invalid(
                "conflict.min_delay_ms exceeds conflict.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.catalog.endpoint, DEFAULT_CATALOG_ENDPOINT);
        assert_eq!(config.catalog.timeout_secs, 30);
        assert_eq!(config.validation.poll_interval_secs, 5);
        assert_eq!(config.conflict.max_restarts, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = Config::for_test();
        config.validation.poll_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = Config::for_test();
        config.conflict.min_delay_ms = 10_000;
        config.conflict.max_delay_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_file_and_env() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "catalog:\n  endpoint: https://catalog.test/api\n\
             validation:\n  poll_interval_secs: 2\n  mark_consumable: true"
        )
        .unwrap();

        std::env::set_var("CATVER__CONFLICT__MAX_RESTARTS", "3");
        std::env::set_var(API_KEY_ENV_VAR, "key-from-env");
        let config = Config::load(Some(file.path().to_str().unwrap()));
        std::env::remove_var("CATVER__CONFLICT__MAX_RESTARTS");
        std::env::remove_var(API_KEY_ENV_VAR);

        let config = config.unwrap();
        assert_eq!(config.catalog.endpoint, "https://catalog.test/api");
        assert_eq!(config.validation.poll_interval_secs, 2);
        assert!(config.validation.mark_consumable);
        assert_eq!(config.conflict.max_restarts, 3);
        assert_eq!(config.auth.api_key.as_deref(), Some("key-from-env"));
    }

    #[test]
    #[serial]
    fn test_load_missing_explicit_file_fails() {
        let result = Config::load(Some("/nonexistent/catver.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}

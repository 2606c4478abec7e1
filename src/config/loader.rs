//! Configuration Loader
//!
//! Environment-aware configuration loading built on the `config` crate.
//! Sources are layered lowest to highest precedence:
//!
//! 1. Built-in defaults ([`CallosumConfig::default`])
//! 2. `{config_dir}/callosum.yaml`
//! 3. `{config_dir}/callosum.{environment}.yaml`
//! 4. `CALLOSUM__SECTION__KEY` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::CallosumConfig;
use crate::logging::log_config_event;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const BASE_FILE_STEM: &str = "callosum";
const ENV_PREFIX: &str = "CALLOSUM";
const ENV_SEPARATOR: &str = "__";

/// Loaded configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: CallosumConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_env_source(config_dir, environment, None)
    }

    /// Wrap an already-built configuration (tests and embedded use)
    pub fn from_config(config: CallosumConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        let environment = Self::detect_environment();
        log_config_event("from_config", &environment, Some("programmatic configuration"));
        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Load with an explicit map standing in for the process environment
    pub(crate) fn load_with_env_source(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_source: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::build_config(&config_directory, environment, env_source)?;
        config.validate()?;

        info!(
            environment = %environment,
            config_directory = %config_directory.display(),
            failure_threshold = config.circuit_breaker.failure_threshold,
            queue_capacity = config.backpressure.queue_capacity_per_destination,
            max_retries = config.dispatch.max_retries,
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    fn build_config(
        config_directory: &Path,
        environment: &str,
        env_source: Option<HashMap<String, String>>,
    ) -> ConfigResult<CallosumConfig> {
        let defaults = Config::try_from(&CallosumConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let base_file = config_directory.join(format!("{BASE_FILE_STEM}.yaml"));
        let env_file = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.yaml"));

        let mut env_vars = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true);
        if env_source.is_some() {
            env_vars = env_vars.source(env_source);
        }

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false))
            .add_source(env_vars)
            .build()
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        merged
            .try_deserialize::<CallosumConfig>()
            .map_err(ConfigurationError::deserialization_error)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &CallosumConfig {
        &self.config
    }

    /// Environment the configuration was loaded for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect the runtime environment from environment variables
    pub fn detect_environment() -> String {
        env::var("CALLOSUM_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("CALLOSUM_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}

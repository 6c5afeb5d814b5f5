//! Configuration loader for YAML files and environment overrides
//!
//! Resolution order: YAML document (or built-in defaults), then `FRAGRUN_*`
//! environment variables, then validation.

use crate::config::types::{FragrunConfig, IsolationMode};
use crate::config::validation;
use crate::errors::ExecutionError;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CONFIG_FILE_NAME: &str = "fragrun.yaml";

pub const ENV_MODE: &str = "FRAGRUN_MODE";
pub const ENV_TIMEOUT_SECS: &str = "FRAGRUN_TIMEOUT_SECS";
pub const ENV_INTERPRETER: &str = "FRAGRUN_INTERPRETER";
pub const ENV_DATA_DIR: &str = "FRAGRUN_DATA_DIR";
pub const ENV_IMAGE: &str = "FRAGRUN_IMAGE";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<FragrunConfig, ExecutionError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            ExecutionError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_str(&content)
    }

    /// Parse configuration from YAML text and apply environment overrides.
    pub fn from_str(content: &str) -> Result<FragrunConfig, ExecutionError> {
        let mut config: FragrunConfig = if content.trim().is_empty() {
            FragrunConfig::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| ExecutionError::Config(format!("Failed to parse YAML: {}", e)))?
        };
        Self::apply_env_overrides(&mut config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Look for `./fragrun.yaml`, then `~/.fragrun/fragrun.yaml`, falling back
    /// to defaults when neither exists.
    pub async fn discover() -> Result<FragrunConfig, ExecutionError> {
        for candidate in Self::candidate_paths() {
            if fs::try_exists(&candidate).await.unwrap_or(false) {
                return Self::from_file(&candidate).await;
            }
        }
        log::info!("No {} found, using default configuration", CONFIG_FILE_NAME);
        Self::from_str("")
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".fragrun").join(CONFIG_FILE_NAME));
        }
        paths
    }

    pub fn apply_env_overrides(config: &mut FragrunConfig) -> Result<(), ExecutionError> {
        if let Ok(mode) = env::var(ENV_MODE) {
            config.execution.mode = mode.parse::<IsolationMode>()?;
        }
        if let Ok(timeout) = env::var(ENV_TIMEOUT_SECS) {
            config.execution.timeout_secs = timeout.trim().parse().map_err(|e| {
                ExecutionError::Config(format!(
                    "{} must be a whole number of seconds, got '{}': {}",
                    ENV_TIMEOUT_SECS, timeout, e
                ))
            })?;
        }
        if let Ok(interpreter) = env::var(ENV_INTERPRETER) {
            config.execution.interpreter = interpreter;
        }
        if let Ok(data_dir) = env::var(ENV_DATA_DIR) {
            config.storage.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(image) = env::var(ENV_IMAGE) {
            config.container.image = image;
        }
        Ok(())
    }
}

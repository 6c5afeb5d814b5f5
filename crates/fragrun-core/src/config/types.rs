//! Configuration types for fragrun
//!
//! Every field carries a serde default so that an empty document, or no
//! document at all, yields a usable local-mode configuration.

use crate::errors::ExecutionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragrunConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub server: ServerSettings,
}

/// Where the registry files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Overrides `<data_dir>/functions.json`.
    #[serde(default)]
    pub functions_file: Option<PathBuf>,
    /// Overrides `<data_dir>/requirements.txt`.
    #[serde(default)]
    pub requirements_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            functions_file: None,
            requirements_file: None,
        }
    }
}

impl StorageConfig {
    pub fn functions_path(&self) -> PathBuf {
        self.functions_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(crate::registry::file::FUNCTIONS_FILE))
    }

    pub fn requirements_path(&self) -> PathBuf {
        self.requirements_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(crate::registry::file::REQUIREMENTS_FILE))
    }
}

/// Isolation boundary a run executes under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    #[default]
    Local,
    Container,
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationMode::Local => write!(f, "local"),
            IsolationMode::Container => write!(f, "container"),
        }
    }
}

impl FromStr for IsolationMode {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(IsolationMode::Local),
            "container" | "docker" => Ok(IsolationMode::Container),
            other => Err(ExecutionError::Config(format!(
                "Unsupported isolation mode: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: IsolationMode,
    /// Wall-clock budget per run, in whole seconds. Applies to both modes.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Host interpreter used for local runs and local package installs.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Parent directory for per-run scratch directories. System temp dir when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Provision persisted dependencies before each run: into the host
    /// interpreter in local mode, as the entrypoint's first step in container mode.
    #[serde(default = "default_true")]
    pub provision_on_run: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: IsolationMode::default(),
            timeout_secs: default_timeout_secs(),
            interpreter: default_interpreter(),
            scratch_dir: None,
            provision_on_run: true,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Pre-built image that already contains the interpreter.
    #[serde(default = "default_image")]
    pub image: String,
    /// Interpreter invoked inside the container.
    #[serde(default = "default_container_interpreter")]
    pub interpreter: String,
    #[serde(default)]
    pub network_disabled: bool,
    #[serde(default)]
    pub memory_limit_bytes: Option<i64>,
    /// Pull the image before creating the container instead of assuming it exists.
    #[serde(default)]
    pub pull_missing_image: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            interpreter: default_container_interpreter(),
            network_disabled: false,
            memory_limit_bytes: None,
            pull_missing_image: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    /// Allowed CORS origins. Any origin when unset.
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
            cors_origins: None,
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_container_interpreter() -> String {
    "python".to_string()
}

fn default_image() -> String {
    "python:3.11-slim".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

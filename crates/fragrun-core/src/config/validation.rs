//! Sanity checks applied after a configuration is loaded and overridden.

use crate::config::types::{FragrunConfig, IsolationMode};
use crate::errors::ExecutionError;

pub fn validate(config: &FragrunConfig) -> Result<(), ExecutionError> {
    if config.execution.timeout_secs == 0 {
        return Err(ExecutionError::Config(
            "execution.timeout_secs must be at least 1".to_string(),
        ));
    }
    if config.execution.interpreter.trim().is_empty() {
        return Err(ExecutionError::Config(
            "execution.interpreter must not be empty".to_string(),
        ));
    }
    if config.container.image.trim().is_empty() {
        return Err(ExecutionError::Config(
            "container.image must not be empty".to_string(),
        ));
    }
    if config.container.interpreter.trim().is_empty() {
        return Err(ExecutionError::Config(
            "container.interpreter must not be empty".to_string(),
        ));
    }
    if let Some(limit) = config.container.memory_limit_bytes {
        if limit <= 0 {
            return Err(ExecutionError::Config(format!(
                "container.memory_limit_bytes must be positive, got {}",
                limit
            )));
        }
    }
    if config.execution.mode == IsolationMode::Container
        && config.container.network_disabled
        && config.execution.provision_on_run
    {
        return Err(ExecutionError::Config(
            "container.network_disabled requires execution.provision_on_run: false, \
             the in-container package install needs network access"
                .to_string(),
        ));
    }
    if config.server.max_body_size == 0 {
        return Err(ExecutionError::Config(
            "server.max_body_size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

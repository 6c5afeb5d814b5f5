//! Error types for the execution pipeline
//!
//! Failures are grouped by where they originate: the registry (missing
//! fragments, unreadable store), the scratch filesystem, the executed program
//! itself, and the sandbox runtime. Every variant maps onto exactly one
//! terminal [`RunStatus`](crate::executors::RunStatus) so that callers always
//! receive a single `(succeeded, message)` pair per run.

use thiserror::Error;

/// Message returned when the registry holds no fragments at all.
pub const NO_FUNCTIONS_MESSAGE: &str = "No functions found";
/// Message returned when fragments exist but none is named `main`.
pub const MAIN_NOT_FOUND_MESSAGE: &str = "Main function not found";
/// Fixed output of a run that exceeded its wall-clock budget.
pub const TIMEOUT_MESSAGE: &str = "The process timed out.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("{0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("The process timed out.")]
    Timeout,
    #[error("Failed to execute script: {0}")]
    ProcessFailure(String),
    #[error("Sandbox setup failed: {0}")]
    SandboxSetup(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Registry error: {0}")]
    Registry(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExecutionError {
    pub fn no_functions() -> Self {
        ExecutionError::NotFound(NO_FUNCTIONS_MESSAGE.to_string())
    }

    pub fn main_not_found() -> Self {
        ExecutionError::NotFound(MAIN_NOT_FOUND_MESSAGE.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecutionError::NotFound(_))
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ExecutionError {
    fn from(err: serde_json::Error) -> Self {
        ExecutionError::Registry(err.to_string())
    }
}

impl From<bollard::errors::Error> for ExecutionError {
    fn from(err: bollard::errors::Error) -> Self {
        ExecutionError::SandboxSetup(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_cases_are_distinguished_by_message() {
        assert_eq!(ExecutionError::no_functions().to_string(), "No functions found");
        assert_eq!(
            ExecutionError::main_not_found().to_string(),
            "Main function not found"
        );
        assert!(ExecutionError::main_not_found().is_not_found());
        assert!(!ExecutionError::Timeout.is_not_found());
    }

    #[test]
    fn timeout_renders_fixed_message() {
        assert_eq!(ExecutionError::Timeout.to_string(), "The process timed out.");
    }

    #[test]
    fn io_errors_convert() {
        let err: ExecutionError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, ExecutionError::Io(ref m) if m.contains("denied")));
    }
}

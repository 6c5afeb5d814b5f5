//! Error types for the fragrun HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fragrun_core::{ExecutionError, RunStatus};
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Requested function, or the `main` function, does not exist
    #[error("{0}")]
    NotFound(String),

    /// Request body or query failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The program ran (or tried to) and reached a failing terminal state
    #[error("{detail}")]
    RunFailed { status: RunStatus, detail: String },

    /// Registry could not be read or written
    #[error("Registry error: {0}")]
    Registry(String),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServerError::RunFailed { .. }
            | ServerError::Registry(_)
            | ServerError::Config(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::NotFound(_) => "not_found",
            ServerError::InvalidInput(_) => "invalid_input",
            ServerError::RunFailed { status, .. } => match status {
                RunStatus::TimedOut => "timed_out",
                RunStatus::Crashed => "crashed",
                _ => "setup_failed",
            },
            ServerError::Registry(_) => "registry_error",
            ServerError::Config(_) => "config_error",
            ServerError::Internal(_) => "internal_error",
        }
    }
}

impl From<ExecutionError> for ServerError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::NotFound(msg) => ServerError::NotFound(msg),
            ExecutionError::InvalidInput(msg) => ServerError::InvalidInput(msg),
            ExecutionError::Config(msg) => ServerError::Config(msg),
            ExecutionError::Registry(_) | ExecutionError::Io(_) => {
                ServerError::Registry(err.to_string())
            }
            other => ServerError::RunFailed {
                status: RunStatus::from(&other),
                detail: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{} ({})", self, self.error_type());
        } else {
            log::warn!("{} ({})", self, self.error_type());
        }
        let body = Json(json!({
            "status": "error",
            "error": self.error_type(),
            "detail": self.to_string(),
            "timestamp": chrono::Utc::now()
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_errors_map_to_http_statuses() {
        let not_found: ServerError = ExecutionError::main_not_found().into();
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "Main function not found");

        let invalid: ServerError = ExecutionError::InvalidInput("bad".into()).into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let timeout: ServerError = ExecutionError::Timeout.into();
        assert_eq!(timeout.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(timeout.error_type(), "timed_out");
        assert_eq!(timeout.to_string(), "The process timed out.");

        let io: ServerError = ExecutionError::Io("disk".into()).into();
        assert_eq!(io.error_type(), "registry_error");
    }
}

//! Execution environments for assembled programs.
//!
//! A run executes under one isolation boundary: a bounded host subprocess
//! ([`local::LocalSandbox`]) or an ephemeral container ([`docker::DockerSandbox`]).
//! Both enforce the same wall-clock budget and report exactly one terminal
//! [`RunResult`].

use crate::errors::ExecutionError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub mod docker;
pub mod local;
pub mod workspace;

pub use docker::DockerSandbox;
pub use local::LocalSandbox;
pub use workspace::RunWorkspace;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    TimedOut,
    Crashed,
    SetupFailed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::TimedOut => "timed_out",
            RunStatus::Crashed => "crashed",
            RunStatus::SetupFailed => "setup_failed",
        };
        f.write_str(name)
    }
}

impl From<&ExecutionError> for RunStatus {
    fn from(err: &ExecutionError) -> Self {
        match err {
            ExecutionError::Timeout => RunStatus::TimedOut,
            ExecutionError::ProcessFailure(_) => RunStatus::Crashed,
            _ => RunStatus::SetupFailed,
        }
    }
}

/// Outcome of one run: stdout on success, a classified message otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub output: String,
}

impl RunResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Succeeded,
            output: stdout.into(),
        }
    }

    pub fn from_error(err: &ExecutionError) -> Self {
        Self {
            status: RunStatus::from(err),
            output: err.to_string(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

impl From<Result<String, ExecutionError>> for RunResult {
    fn from(result: Result<String, ExecutionError>) -> Self {
        match result {
            Ok(stdout) => RunResult::success(stdout),
            Err(e) => RunResult::from_error(&e),
        }
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    fn name(&self) -> &'static str;

    /// Execute the program prepared in `workspace`, bounded by `timeout`.
    async fn execute(&self, workspace: &RunWorkspace, timeout: Duration) -> RunResult;
}

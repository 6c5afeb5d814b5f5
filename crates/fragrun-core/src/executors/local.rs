//! Bounded host subprocess execution.

use super::{RunResult, RunWorkspace, Sandbox};
use crate::errors::ExecutionError;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs the program with the host interpreter as a child process. The child
/// and everything it spawned are killed when the wall-clock budget elapses.
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    interpreter: String,
}

impl LocalSandbox {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    async fn run(&self, workspace: &RunWorkspace, timeout: Duration) -> Result<String, ExecutionError> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg(workspace.program_path())
            .current_dir(workspace.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            ExecutionError::SandboxSetup(format!(
                "could not start interpreter '{}': {}",
                self.interpreter, e
            ))
        })?;
        let _group = ProcessGroup(child.id());

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                log::error!("The process timed out (run {})", workspace.run_id());
                return Err(ExecutionError::Timeout);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, stderr.trim_end())
            };
            log::error!("Failed to execute script (run {}): {}", workspace.run_id(), detail);
            return Err(ExecutionError::ProcessFailure(detail));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Kills the child's whole process group when dropped, so background work the
/// program started does not outlive the run.
#[cfg_attr(not(unix), allow(dead_code))]
struct ProcessGroup(Option<u32>);

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pgid) = self.0 {
                // ESRCH means every member has already exited.
                unsafe {
                    libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
                }
            }
        }
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute(&self, workspace: &RunWorkspace, timeout: Duration) -> RunResult {
        log::info!(
            "Running {} with {} (timeout {}s)",
            workspace.program_path().display(),
            self.interpreter,
            timeout.as_secs()
        );
        RunResult::from(self.run(workspace, timeout).await)
    }
}

// src/executors/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
#[allow(deprecated)]
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::time::Duration;

use super::{RunResult, RunWorkspace, Sandbox};
use crate::config::ContainerConfig;
use crate::errors::ExecutionError;

pub const CONTAINER_WORK_DIR: &str = "/sandbox";
pub const CONTAINER_PROGRAM_PATH: &str = "/sandbox/main.py";
pub const CONTAINER_REQUIREMENTS_PATH: &str = "/sandbox/requirements.txt";

struct ContainerOutput {
    exit_code: i64,
    stdout: String,
    stderr: String,
}

/// Runs each program in a fresh container created from a pre-built image.
/// The container is force-removed after every run, including on timeout.
pub struct DockerSandbox {
    docker: Docker,
    settings: ContainerConfig,
}

impl DockerSandbox {
    pub fn new(settings: ContainerConfig) -> Result<Self, ExecutionError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker, settings })
    }

    pub fn with_client(docker: Docker, settings: ContainerConfig) -> Self {
        Self { docker, settings }
    }

    pub fn settings(&self) -> &ContainerConfig {
        &self.settings
    }

    /// Pull the configured image unless it is already present locally.
    pub async fn ensure_image(&self) -> Result<(), ExecutionError> {
        match self.docker.inspect_image(&self.settings.image).await {
            Ok(_) => return Ok(()),
            Err(e) if is_missing_image(&e) => {}
            Err(e) => {
                return Err(ExecutionError::SandboxSetup(format!(
                    "could not inspect image '{}': {}",
                    self.settings.image, e
                )))
            }
        }

        log::info!("Pulling sandbox image {}", self.settings.image);
        #[allow(deprecated)]
        let mut pull = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: self.settings.image.clone(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            match progress {
                Ok(info) => log::debug!("Pulling image: {:?}", info),
                Err(e) => {
                    return Err(ExecutionError::SandboxSetup(format!(
                        "could not pull image '{}': {}",
                        self.settings.image, e
                    )))
                }
            }
        }
        Ok(())
    }

    async fn create(&self, workspace: &RunWorkspace) -> Result<String, ExecutionError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(container_name(workspace)),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(self.settings.image.clone()),
            cmd: Some(container_command(
                &self.settings.interpreter,
                workspace.install_step(),
            )),
            working_dir: Some(CONTAINER_WORK_DIR.to_string()),
            host_config: Some(host_config(&self.settings, workspace)),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let container = self.docker.create_container(options, config).await?;
        Ok(container.id)
    }

    async fn run_container(&self, id: &str) -> Result<ContainerOutput, ExecutionError> {
        self.docker
            .start_container(id, None::<BollardStartContainerOptionsQuery>)
            .await?;

        let mut wait_stream = self
            .docker
            .wait_container(id, None::<BollardWaitContainerOptionsQuery>);
        let exit_code = match wait_stream.next().await {
            Some(Ok(response)) => response.status_code,
            // Non-zero exits arrive as a wait error carrying the status code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(ExecutionError::SandboxSetup(
                    "container wait stream ended unexpectedly".to_string(),
                ))
            }
        };

        let mut log_stream = self.docker.logs(
            id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(log_result) = log_stream.next().await {
            match log_result? {
                LogOutput::StdOut { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
                LogOutput::StdErr { message } => stderr.push_str(&String::from_utf8_lossy(&message)),
                _ => {}
            }
        }

        Ok(ContainerOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn remove(&self, id: &str) {
        let options = Some(BollardRemoveContainerOptionsQuery {
            force: true,
            ..Default::default()
        });
        if let Err(e) = self.docker.remove_container(id, options).await {
            log::warn!("Failed to remove container {}: {}", id, e);
        }
    }

    async fn run(&self, workspace: &RunWorkspace, timeout: Duration) -> Result<String, ExecutionError> {
        if self.settings.pull_missing_image {
            self.ensure_image().await?;
        }

        let id = self.create(workspace).await?;
        log::info!(
            "Created container {} for run {} from {}",
            id,
            workspace.run_id(),
            self.settings.image
        );

        let outcome = tokio::time::timeout(timeout, self.run_container(&id)).await;
        // Force removal also stops a container that is still running.
        self.remove(&id).await;

        let output = match outcome {
            Ok(output) => output?,
            Err(_) => {
                log::warn!("Execution timed out for container {}", id);
                return Err(ExecutionError::Timeout);
            }
        };

        if output.exit_code != 0 {
            // Install failures and program crashes both end up here.
            return Err(ExecutionError::ProcessFailure(format!(
                "container exited with status {}: {}",
                output.exit_code,
                output.stderr.trim_end()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn execute(&self, workspace: &RunWorkspace, timeout: Duration) -> RunResult {
        let result = self.run(workspace, timeout).await;
        if let Err(e) = &result {
            log::error!("Container run {} failed: {}", workspace.run_id(), e);
        }
        RunResult::from(result)
    }
}

fn is_missing_image(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn container_name(workspace: &RunWorkspace) -> String {
    format!("fragrun-run-{}", workspace.run_id())
}

/// Entrypoint: the optional install step, then the program.
pub fn container_command(interpreter: &str, install_step: Option<&str>) -> Vec<String> {
    match install_step {
        Some(step) => vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("{} && exec {} {}", step, interpreter, CONTAINER_PROGRAM_PATH),
        ],
        None => vec![interpreter.to_string(), CONTAINER_PROGRAM_PATH.to_string()],
    }
}

pub fn bind_mounts(workspace: &RunWorkspace) -> Vec<String> {
    vec![
        format!(
            "{}:{}:ro",
            workspace.program_path().display(),
            CONTAINER_PROGRAM_PATH
        ),
        format!(
            "{}:{}:ro",
            workspace.requirements_path().display(),
            CONTAINER_REQUIREMENTS_PATH
        ),
    ]
}

fn host_config(settings: &ContainerConfig, workspace: &RunWorkspace) -> HostConfig {
    HostConfig {
        binds: Some(bind_mounts(workspace)),
        network_mode: settings
            .network_disabled
            .then(|| "none".to_string()),
        memory: settings.memory_limit_bytes,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::RunStatus;
    use crate::provisioner::{ContainerProvisioner, Provisioner, Provisioning};

    #[test]
    fn command_without_install_step_runs_program_directly() {
        assert_eq!(
            container_command("python", None),
            vec!["python", "/sandbox/main.py"]
        );
    }

    #[test]
    fn command_with_install_step_installs_first() {
        let cmd = container_command(
            "python",
            Some("python -m pip install -r /sandbox/requirements.txt"),
        );
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");
        assert_eq!(
            cmd[2],
            "python -m pip install -r /sandbox/requirements.txt && exec python /sandbox/main.py"
        );
    }

    #[tokio::test]
    async fn mounts_are_read_only_at_fixed_paths() {
        let workspace = RunWorkspace::prepare(None, "print(1)", &[]).await.unwrap();
        let binds = bind_mounts(&workspace);
        assert_eq!(binds.len(), 2);
        assert!(binds[0].ends_with(":/sandbox/main.py:ro"));
        assert!(binds[0].starts_with(&workspace.program_path().display().to_string()));
        assert!(binds[1].ends_with(":/sandbox/requirements.txt:ro"));
    }

    #[tokio::test]
    async fn host_config_applies_limits() {
        let workspace = RunWorkspace::prepare(None, "", &[]).await.unwrap();
        let settings = ContainerConfig {
            network_disabled: true,
            memory_limit_bytes: Some(64 * 1024 * 1024),
            ..Default::default()
        };
        let config = host_config(&settings, &workspace);
        assert_eq!(config.network_mode.as_deref(), Some("none"));
        assert_eq!(config.memory, Some(64 * 1024 * 1024));
        assert_eq!(config.auto_remove, None);

        let open = host_config(&ContainerConfig::default(), &workspace);
        assert_eq!(open.network_mode, None);
    }

    #[test]
    fn only_a_404_counts_as_a_missing_image() {
        let missing = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such image: python:3.11-slim".to_string(),
        };
        assert!(is_missing_image(&missing));

        let daemon_error = BollardError::DockerResponseServerError {
            status_code: 500,
            message: "internal error".to_string(),
        };
        assert!(!is_missing_image(&daemon_error));
        assert!(!is_missing_image(&BollardError::RequestTimeoutError));
    }

    async fn docker_sandbox() -> DockerSandbox {
        let settings = ContainerConfig {
            pull_missing_image: true,
            ..Default::default()
        };
        DockerSandbox::new(settings).unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker daemon
    async fn container_run_returns_stdout() {
        let sandbox = docker_sandbox().await;
        let workspace = RunWorkspace::prepare(None, "print('hi')", &[]).await.unwrap();
        let result = sandbox.execute(&workspace, Duration::from_secs(60)).await;
        assert_eq!(result, RunResult::success("hi\n"));
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker daemon
    async fn container_crash_reports_stderr() {
        let sandbox = docker_sandbox().await;
        let workspace =
            RunWorkspace::prepare(None, "import sys\nsys.exit('bad')", &[]).await.unwrap();
        let result = sandbox.execute(&workspace, Duration::from_secs(60)).await;
        assert_eq!(result.status, RunStatus::Crashed);
        assert!(result.output.contains("bad"));
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker daemon
    async fn container_run_is_bounded_by_timeout() {
        let sandbox = docker_sandbox().await;
        sandbox.ensure_image().await.unwrap();
        let workspace =
            RunWorkspace::prepare(None, "import time\ntime.sleep(30)", &[]).await.unwrap();
        let result = sandbox.execute(&workspace, Duration::from_secs(2)).await;
        assert_eq!(result.status, RunStatus::TimedOut);
    }

    #[tokio::test]
    #[ignore] // Requires a running Docker daemon
    async fn failed_install_surfaces_as_container_crash() {
        let sandbox = docker_sandbox().await;
        let deps = vec!["this-package-does-not-exist-fragrun".to_string()];
        let mut workspace = RunWorkspace::prepare(None, "print(1)", &deps).await.unwrap();
        match ContainerProvisioner::new("python")
            .provision(workspace.dependencies(), workspace.requirements_path())
            .await
        {
            Provisioning::Deferred { install_step } => workspace.set_install_step(install_step),
            other => panic!("expected deferred provisioning, got {:?}", other),
        }
        let result = sandbox.execute(&workspace, Duration::from_secs(120)).await;
        assert_eq!(result.status, RunStatus::Crashed);
    }
}

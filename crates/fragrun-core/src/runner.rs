//! End-to-end run pipeline: registry → assembler → provisioner → sandbox.

use crate::assembler::assemble;
use crate::config::{ExecutionConfig, FragrunConfig, IsolationMode};
use crate::errors::ExecutionError;
use crate::executors::{DockerSandbox, LocalSandbox, RunResult, RunWorkspace, Sandbox};
use crate::provisioner::{
    ContainerProvisioner, LocalProvisioner, ProvisionReport, Provisioner, Provisioning,
};
use crate::registry::RegistryStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Executes the registered program under one isolation mode.
///
/// Runs share nothing but the registry; each gets its own workspace, which is
/// removed once the run reaches a terminal state.
#[derive(Clone)]
pub struct Runner {
    store: Arc<dyn RegistryStore>,
    sandbox: Arc<dyn Sandbox>,
    provisioner: Arc<dyn Provisioner>,
    host_installer: LocalProvisioner,
    timeout: Duration,
    scratch_dir: Option<PathBuf>,
    provision_on_run: bool,
}

impl Runner {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        sandbox: Arc<dyn Sandbox>,
        provisioner: Arc<dyn Provisioner>,
        execution: &ExecutionConfig,
    ) -> Self {
        Self {
            store,
            sandbox,
            provisioner,
            host_installer: LocalProvisioner::new(execution.interpreter.clone()),
            timeout: execution.timeout(),
            scratch_dir: execution.scratch_dir.clone(),
            provision_on_run: execution.provision_on_run,
        }
    }

    /// Wire the sandbox and provisioner matching `config.execution.mode`.
    pub fn from_config(
        store: Arc<dyn RegistryStore>,
        config: &FragrunConfig,
    ) -> Result<Self, ExecutionError> {
        let (sandbox, provisioner): (Arc<dyn Sandbox>, Arc<dyn Provisioner>) =
            match config.execution.mode {
                IsolationMode::Local => (
                    Arc::new(LocalSandbox::new(config.execution.interpreter.clone())),
                    Arc::new(LocalProvisioner::new(config.execution.interpreter.clone())),
                ),
                IsolationMode::Container => (
                    Arc::new(DockerSandbox::new(config.container.clone())?),
                    Arc::new(ContainerProvisioner::new(
                        config.container.interpreter.clone(),
                    )),
                ),
            };
        log::info!(
            "Runner configured for {} mode (timeout {}s)",
            config.execution.mode,
            config.execution.timeout_secs
        );
        Ok(Self::new(store, sandbox, provisioner, &config.execution))
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    pub fn sandbox_name(&self) -> &'static str {
        self.sandbox.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Assemble and execute the registered program.
    ///
    /// Returns `Err(NotFound)` when there is nothing to run. Every other
    /// failure is reported as a terminal [`RunResult`].
    pub async fn run_main(&self) -> Result<RunResult, ExecutionError> {
        let fragments = self.store.list_fragments().await?;
        let program = assemble(&fragments)?;
        let dependencies = self.store.list_dependencies().await?;

        Ok(self.run_program(&program, &dependencies).await)
    }

    /// Execute an already assembled program with the given dependencies.
    pub async fn run_program(&self, program: &str, dependencies: &[String]) -> RunResult {
        let mut workspace =
            match RunWorkspace::prepare(self.scratch_dir.as_deref(), program, dependencies).await {
                Ok(workspace) => workspace,
                Err(e) => {
                    log::error!("Failed to prepare run workspace: {}", e);
                    return RunResult::from_error(&e);
                }
            };
        log::info!(
            "Run {} started ({} sandbox)",
            workspace.run_id(),
            self.sandbox.name()
        );

        if self.provision_on_run {
            match self
                .provisioner
                .provision(workspace.dependencies(), workspace.requirements_path())
                .await
            {
                Provisioning::Completed(report) if !report.succeeded => {
                    return RunResult::from_error(&ExecutionError::SandboxSetup(report.message));
                }
                Provisioning::Completed(_) => {}
                Provisioning::Deferred { install_step } => workspace.set_install_step(install_step),
            }
        }

        let result = self.sandbox.execute(&workspace, self.timeout).await;
        log::info!("Run {} finished: {}", workspace.run_id(), result.status);
        result
    }

    /// Install the persisted dependency list into the host interpreter.
    pub async fn install_dependencies(&self) -> ProvisionReport {
        let dependencies = match self.store.list_dependencies().await {
            Ok(dependencies) => dependencies,
            Err(e) => return ProvisionReport::failure(format!("Failed to install packages: {}", e)),
        };
        let mut workspace = match RunWorkspace::create(self.scratch_dir.as_deref()).await {
            Ok(workspace) => workspace,
            Err(e) => return ProvisionReport::failure(format!("Failed to install packages: {}", e)),
        };
        if let Err(e) = workspace.write_requirements(&dependencies).await {
            return ProvisionReport::failure(format!("Failed to install packages: {}", e));
        }
        self.host_installer
            .install(workspace.dependencies(), workspace.requirements_path())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MAIN_NOT_FOUND_MESSAGE;
    use crate::executors::RunStatus;
    use crate::registry::{Fragment, MemoryRegistry};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn sh_runner(store: Arc<dyn RegistryStore>, timeout_secs: u64) -> Runner {
        let execution = ExecutionConfig {
            interpreter: "sh".to_string(),
            timeout_secs,
            provision_on_run: false,
            ..Default::default()
        };
        Runner::new(
            store,
            Arc::new(LocalSandbox::new("sh")),
            Arc::new(LocalProvisioner::new("sh")),
            &execution,
        )
    }

    /// Records what it was asked to run instead of running it.
    #[derive(Default)]
    struct RecordingSandbox {
        seen: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl Sandbox for RecordingSandbox {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn execute(&self, workspace: &RunWorkspace, _timeout: Duration) -> RunResult {
            let program = std::fs::read_to_string(workspace.program_path()).unwrap();
            self.seen
                .lock()
                .unwrap()
                .push((program.clone(), workspace.install_step().map(str::to_string)));
            RunResult::success(program)
        }
    }

    #[tokio::test]
    async fn empty_registry_is_not_found() {
        let runner = sh_runner(Arc::new(MemoryRegistry::new()), 5);
        let err = runner.run_main().await.unwrap_err();
        assert_eq!(err, ExecutionError::no_functions());
    }

    #[tokio::test]
    async fn registry_without_main_is_not_found() {
        let store = MemoryRegistry::with_fragments(vec![Fragment::new("helper", "echo 1")]);
        let runner = sh_runner(Arc::new(store), 5);
        let err = runner.run_main().await.unwrap_err();
        assert_eq!(err.to_string(), MAIN_NOT_FOUND_MESSAGE);
    }

    #[tokio::test]
    async fn helper_before_main_runs() {
        let store = MemoryRegistry::with_fragments(vec![
            Fragment::new("helper", "helper() {\n  echo 1\n}"),
            Fragment::new("main", "helper"),
        ]);
        let runner = sh_runner(Arc::new(store), 5);
        let result = runner.run_main().await.unwrap();
        assert_eq!(result, RunResult::success("1\n"));
    }

    #[tokio::test]
    async fn reruns_are_independent_and_identical() {
        let store = MemoryRegistry::with_fragments(vec![Fragment::new("main", "echo same")]);
        let runner = sh_runner(Arc::new(store), 5);
        let first = runner.run_main().await.unwrap();
        let second = runner.run_main().await.unwrap();
        assert!(first.succeeded());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn timeout_and_crash_are_terminal_results() {
        let store = Arc::new(MemoryRegistry::with_fragments(vec![Fragment::new(
            "main", "sleep 10",
        )]));
        let runner = sh_runner(store.clone(), 1);
        assert_eq!(
            runner.run_main().await.unwrap().status,
            RunStatus::TimedOut
        );

        store
            .upsert_fragment(Fragment::new("main", "exit 7"))
            .await
            .unwrap();
        let result = runner.run_main().await.unwrap();
        assert_eq!(result.status, RunStatus::Crashed);
        assert!(!result.output.is_empty());
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_interleave() {
        let sandbox = Arc::new(RecordingSandbox::default());
        let execution = ExecutionConfig {
            provision_on_run: false,
            ..Default::default()
        };
        let runner = Runner::new(
            Arc::new(MemoryRegistry::new()),
            sandbox.clone(),
            Arc::new(LocalProvisioner::new("sh")),
            &execution,
        );

        let programs: Vec<String> = (0..16).map(|i| format!("program {}", i)).collect();
        let handles: Vec<_> = programs
            .iter()
            .cloned()
            .map(|program| {
                let runner = runner.clone();
                tokio::spawn(async move { (program.clone(), runner.run_program(&program, &[]).await) })
            })
            .collect();

        for handle in handles {
            let (program, result) = handle.await.unwrap();
            assert_eq!(result, RunResult::success(program));
        }
        assert_eq!(sandbox.seen.lock().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn failed_host_install_aborts_the_run() {
        let store = Arc::new(MemoryRegistry::with_fragments(vec![Fragment::new(
            "main", "echo ran",
        )]));
        store.add_dependency("requests").await.unwrap();
        let sandbox = Arc::new(RecordingSandbox::default());
        let execution = ExecutionConfig::default();
        let runner = Runner::new(
            store,
            sandbox.clone(),
            Arc::new(LocalProvisioner::new("false")),
            &execution,
        );

        let result = runner.run_main().await.unwrap();
        assert_eq!(result.status, RunStatus::SetupFailed);
        assert!(result.output.contains("Failed to install packages"));
        assert!(sandbox.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deferred_install_reaches_the_sandbox() {
        let store = Arc::new(MemoryRegistry::with_fragments(vec![Fragment::new(
            "main", "print(1)",
        )]));
        store.add_dependency("requests").await.unwrap();
        let sandbox = Arc::new(RecordingSandbox::default());
        let runner = Runner::new(
            store,
            sandbox.clone(),
            Arc::new(ContainerProvisioner::new("python")),
            &ExecutionConfig::default(),
        );

        assert!(runner.run_main().await.unwrap().succeeded());
        let seen = sandbox.seen.lock().unwrap();
        let step = seen[0].1.as_deref().unwrap();
        assert!(step.contains("pip install"));
    }

    #[tokio::test]
    async fn install_dependencies_uses_host_interpreter() {
        let store = Arc::new(MemoryRegistry::new());
        let execution = ExecutionConfig {
            interpreter: "true".to_string(),
            ..Default::default()
        };
        let runner = Runner::new(
            store.clone(),
            Arc::new(LocalSandbox::new("true")),
            Arc::new(LocalProvisioner::new("true")),
            &execution,
        );

        let report = runner.install_dependencies().await;
        assert!(report.succeeded);
        assert_eq!(report.message, crate::provisioner::NOTHING_TO_INSTALL_MESSAGE);

        store.add_dependency("requests").await.unwrap();
        let report = runner.install_dependencies().await;
        assert!(report.succeeded);
        assert_eq!(report.message, crate::provisioner::INSTALL_SUCCESS_MESSAGE);
    }
}

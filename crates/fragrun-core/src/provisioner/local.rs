//! Installs packages into the host interpreter with `pip`.

use super::{
    ProvisionReport, Provisioner, Provisioning, INSTALL_SUCCESS_MESSAGE,
    NOTHING_TO_INSTALL_MESSAGE,
};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct LocalProvisioner {
    interpreter: String,
}

impl LocalProvisioner {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Run `<interpreter> -m pip install -r <requirements_file>` to completion.
    pub async fn install(&self, dependencies: &[String], requirements_file: &Path) -> ProvisionReport {
        if dependencies.is_empty() {
            log::info!("No packages to install");
            return ProvisionReport::success(NOTHING_TO_INSTALL_MESSAGE);
        }

        log::info!(
            "Installing {} package(s) from {}",
            dependencies.len(),
            requirements_file.display()
        );
        let output = Command::new(&self.interpreter)
            .args(["-m", "pip", "install", "-r"])
            .arg(requirements_file)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                log::info!("All packages installed successfully");
                ProvisionReport::success(INSTALL_SUCCESS_MESSAGE)
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = format!(
                    "Failed to install packages: {} {}",
                    output.status,
                    stderr.trim_end()
                );
                log::error!("{}", message);
                ProvisionReport::failure(message.trim_end())
            }
            Err(e) => {
                let message = format!(
                    "Failed to install packages: could not run '{}': {}",
                    self.interpreter, e
                );
                log::error!("{}", message);
                ProvisionReport::failure(message)
            }
        }
    }
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn provision(&self, dependencies: &[String], requirements_file: &Path) -> Provisioning {
        Provisioning::Completed(self.install(dependencies, requirements_file).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn requirements(dir: &Path, packages: &[&str]) -> (Vec<String>, std::path::PathBuf) {
        let path = dir.join("requirements.txt");
        std::fs::write(&path, packages.join("\n")).unwrap();
        (packages.iter().map(|p| p.to_string()).collect(), path)
    }

    #[tokio::test]
    async fn empty_list_is_a_no_op_success() {
        let dir = tempdir().unwrap();
        let (deps, path) = requirements(dir.path(), &[]);
        // The interpreter does not exist; it must not be invoked.
        let report = LocalProvisioner::new("/nonexistent/python")
            .install(&deps, &path)
            .await;
        assert!(report.succeeded);
        assert_eq!(report.message, NOTHING_TO_INSTALL_MESSAGE);
    }

    #[tokio::test]
    async fn installer_exit_zero_is_success() {
        let dir = tempdir().unwrap();
        let (deps, path) = requirements(dir.path(), &["requests"]);
        let provisioning = LocalProvisioner::new("true").provision(&deps, &path).await;
        assert_eq!(
            provisioning,
            Provisioning::Completed(ProvisionReport::success(INSTALL_SUCCESS_MESSAGE))
        );
    }

    #[tokio::test]
    async fn installer_failure_is_reported_not_raised() {
        let dir = tempdir().unwrap();
        let (deps, path) = requirements(dir.path(), &["requests"]);
        let report = LocalProvisioner::new("false").install(&deps, &path).await;
        assert!(!report.succeeded);
        assert!(report.message.starts_with("Failed to install packages:"));
    }

    #[tokio::test]
    async fn missing_installer_is_reported() {
        let dir = tempdir().unwrap();
        let (deps, path) = requirements(dir.path(), &["requests"]);
        let report = LocalProvisioner::new("/nonexistent/python")
            .install(&deps, &path)
            .await;
        assert!(!report.succeeded);
        assert!(report.message.contains("/nonexistent/python"));
    }

    #[tokio::test]
    async fn unreachable_index_fails_with_installer_detail() {
        if which::which("python3").is_err() {
            eprintln!("python3 not on PATH, skipping");
            return;
        }
        let dir = tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        std::fs::write(
            &path,
            "--index-url http://127.0.0.1:9/simple\nfragrun-missing-package",
        )
        .unwrap();
        let report = LocalProvisioner::new("python3")
            .install(&["fragrun-missing-package".to_string()], &path)
            .await;
        assert!(!report.succeeded);
        assert!(report.message.starts_with("Failed to install packages:"));
    }
}

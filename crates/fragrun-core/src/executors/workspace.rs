//! Per-run scratch directory.
//!
//! Each run gets its own uniquely named directory holding the assembled
//! program and a snapshot of the dependency list, so concurrent runs never
//! read each other's files. The directory is removed when the workspace is
//! dropped, whatever the outcome of the run.

use crate::errors::ExecutionError;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

pub const PROGRAM_EXTENSION: &str = "py";
pub const REQUIREMENTS_FILE_NAME: &str = "requirements.txt";

#[derive(Debug)]
pub struct RunWorkspace {
    run_id: Uuid,
    dir: TempDir,
    program_path: PathBuf,
    requirements_path: PathBuf,
    dependencies: Vec<String>,
    install_step: Option<String>,
}

impl RunWorkspace {
    /// Create an empty scratch directory under `scratch_root`, or the system
    /// temp directory when `None`.
    pub async fn create(scratch_root: Option<&Path>) -> Result<Self, ExecutionError> {
        let run_id = Uuid::new_v4();
        let prefix = format!("fragrun-run-{}-", run_id);
        let dir = match scratch_root {
            Some(root) => {
                fs::create_dir_all(root).await?;
                Builder::new().prefix(&prefix).tempdir_in(root)?
            }
            None => Builder::new().prefix(&prefix).tempdir()?,
        };
        // Bind mounts need absolute host paths.
        let base = fs::canonicalize(dir.path()).await?;

        Ok(Self {
            run_id,
            program_path: base.join(format!("main_{}.{}", run_id.simple(), PROGRAM_EXTENSION)),
            requirements_path: base.join(REQUIREMENTS_FILE_NAME),
            dir,
            dependencies: Vec::new(),
            install_step: None,
        })
    }

    /// Create a workspace holding `program` and a snapshot of `dependencies`.
    /// The requirements file is always written, even when empty.
    pub async fn prepare(
        scratch_root: Option<&Path>,
        program: &str,
        dependencies: &[String],
    ) -> Result<Self, ExecutionError> {
        let mut workspace = Self::create(scratch_root).await?;
        workspace.write_program(program).await?;
        workspace.write_requirements(dependencies).await?;
        log::debug!(
            "Prepared workspace {} for run {}",
            workspace.dir().display(),
            workspace.run_id
        );
        Ok(workspace)
    }

    pub async fn write_program(&self, program: &str) -> Result<(), ExecutionError> {
        write_file(&self.program_path, program).await.map_err(|e| {
            ExecutionError::Io(format!(
                "Failed to write to script file {}: {}",
                self.program_path.display(),
                e
            ))
        })
    }

    pub async fn write_requirements(
        &mut self,
        dependencies: &[String],
    ) -> Result<(), ExecutionError> {
        write_file(&self.requirements_path, &dependencies.join("\n"))
            .await
            .map_err(|e| {
                ExecutionError::Io(format!(
                    "Failed to write requirements file {}: {}",
                    self.requirements_path.display(),
                    e
                ))
            })?;
        self.dependencies = dependencies.to_vec();
        Ok(())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn program_path(&self) -> &Path {
        &self.program_path
    }

    pub fn requirements_path(&self) -> &Path {
        &self.requirements_path
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Shell step the sandbox must run before the program, if provisioning
    /// was deferred into the sandbox.
    pub fn install_step(&self) -> Option<&str> {
        self.install_step.as_deref()
    }

    pub fn set_install_step(&mut self, step: impl Into<String>) {
        self.install_step = Some(step.into());
    }
}

async fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn prepare_writes_program_and_requirements() {
        let root = tempdir().unwrap();
        let workspace = RunWorkspace::prepare(
            Some(root.path()),
            "print(1)",
            &["requests".to_string(), "numpy".to_string()],
        )
        .await
        .unwrap();

        assert!(workspace.program_path().is_absolute());
        assert_eq!(
            std::fs::read_to_string(workspace.program_path()).unwrap(),
            "print(1)"
        );
        assert_eq!(
            std::fs::read_to_string(workspace.requirements_path()).unwrap(),
            "requests\nnumpy"
        );
        assert_eq!(workspace.dependencies(), ["requests", "numpy"]);
        assert!(workspace.install_step().is_none());
    }

    #[tokio::test]
    async fn empty_dependency_file_still_exists() {
        let workspace = RunWorkspace::prepare(None, "", &[]).await.unwrap();
        assert!(workspace.requirements_path().exists());
        assert_eq!(
            std::fs::read_to_string(workspace.requirements_path()).unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn workspaces_are_unique_and_removed_on_drop() {
        let root = tempdir().unwrap();
        let first = RunWorkspace::prepare(Some(root.path()), "a", &[]).await.unwrap();
        let second = RunWorkspace::prepare(Some(root.path()), "b", &[]).await.unwrap();

        assert_ne!(first.run_id(), second.run_id());
        assert_ne!(first.program_path(), second.program_path());
        assert_eq!(std::fs::read_to_string(first.program_path()).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(second.program_path()).unwrap(), "b");

        let dir = first.dir().to_path_buf();
        drop(first);
        assert!(!dir.exists());
        assert!(second.dir().exists());
    }

    #[tokio::test]
    async fn unwritable_root_is_an_io_error() {
        let root = tempdir().unwrap();
        let blocker = root.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = RunWorkspace::prepare(Some(&blocker.join("nested")), "x", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Io(_)));
    }
}

//! Defers installation to the container entrypoint.

use super::{ProvisionReport, Provisioner, Provisioning, NOTHING_TO_INSTALL_MESSAGE};
use crate::executors::docker::CONTAINER_REQUIREMENTS_PATH;
use async_trait::async_trait;
use std::path::Path;

/// Produces the install step for the in-container interpreter. The host path
/// of the requirements file is irrelevant: the sandbox mounts it at
/// [`CONTAINER_REQUIREMENTS_PATH`].
#[derive(Debug, Clone)]
pub struct ContainerProvisioner {
    interpreter: String,
}

impl ContainerProvisioner {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub fn install_step(&self) -> String {
        format!(
            "{} -m pip install --no-cache-dir --disable-pip-version-check -r {}",
            self.interpreter, CONTAINER_REQUIREMENTS_PATH
        )
    }
}

#[async_trait]
impl Provisioner for ContainerProvisioner {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn provision(&self, dependencies: &[String], _requirements_file: &Path) -> Provisioning {
        if dependencies.is_empty() {
            return Provisioning::Completed(ProvisionReport::success(NOTHING_TO_INSTALL_MESSAGE));
        }
        log::debug!(
            "Deferring installation of {} package(s) to the container",
            dependencies.len()
        );
        Provisioning::Deferred {
            install_step: self.install_step(),
        }
    }
}

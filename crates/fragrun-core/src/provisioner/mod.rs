//! Dependency provisioning strategies.
//!
//! A provisioner makes the persisted package list available to a run. The
//! local strategy installs into the host interpreter before the run; the
//! container strategy defers installation to the first step of the
//! container's entrypoint.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;

pub mod container;
pub mod local;

pub use container::ContainerProvisioner;
pub use local::LocalProvisioner;

pub const INSTALL_SUCCESS_MESSAGE: &str = "All packages installed successfully.";
pub const NOTHING_TO_INSTALL_MESSAGE: &str = "No packages to install.";

/// Aggregate result of an installation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub succeeded: bool,
    pub message: String,
}

impl ProvisionReport {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioning {
    /// Installation already ran (or had nothing to do) on the host.
    Completed(ProvisionReport),
    /// Installation must run inside the sandbox before the program.
    Deferred { install_step: String },
}

impl Provisioning {
    pub fn succeeded(&self) -> bool {
        match self {
            Provisioning::Completed(report) => report.succeeded,
            Provisioning::Deferred { .. } => true,
        }
    }
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make `dependencies`, also listed one per line in `requirements_file`,
    /// available to the next run. Never fails hard: installer problems are
    /// reported in the returned value.
    async fn provision(&self, dependencies: &[String], requirements_file: &Path) -> Provisioning;
}

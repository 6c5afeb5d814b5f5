//! Fragment and dependency registry.
//!
//! The registry is the only durable state of the service: an ordered mapping
//! from fragment name to source text, and an ordered set of package names.
//! The run pipeline consumes it through [`RegistryStore`] and never touches
//! the persistence format directly.

use crate::errors::ExecutionError;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub mod file;
pub mod memory;

pub use file::FileRegistry;
pub use memory::MemoryRegistry;

/// A named unit of source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub name: String,
    pub code: String,
}

impl Fragment {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

/// Whether an upsert replaced an existing fragment or appended a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Added,
    Updated,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Added => "added",
            UpsertOutcome::Updated => "updated",
        }
    }
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// All fragments in registry order. Empty when nothing was ever saved.
    async fn list_fragments(&self) -> Result<Vec<Fragment>, ExecutionError>;

    async fn get_fragment(&self, name: &str) -> Result<Option<Fragment>, ExecutionError> {
        Ok(self
            .list_fragments()
            .await?
            .into_iter()
            .find(|fragment| fragment.name == name))
    }

    /// Fragments whose names appear in `names`, in registry order.
    async fn get_fragments(&self, names: &[String]) -> Result<Vec<Fragment>, ExecutionError> {
        Ok(self
            .list_fragments()
            .await?
            .into_iter()
            .filter(|fragment| names.iter().any(|name| name == &fragment.name))
            .collect())
    }

    async fn upsert_fragment(&self, fragment: Fragment) -> Result<UpsertOutcome, ExecutionError>;

    async fn upsert_fragments(&self, fragments: Vec<Fragment>) -> Result<(), ExecutionError>;

    /// Dependency names in insertion order. Empty when nothing was ever saved.
    async fn list_dependencies(&self) -> Result<Vec<String>, ExecutionError>;

    /// Returns `false` when the package was already present.
    async fn add_dependency(&self, package: &str) -> Result<bool, ExecutionError>;

    async fn add_dependencies(&self, packages: Vec<String>) -> Result<(), ExecutionError>;

    /// Returns `false` when the package was not in the list.
    async fn remove_dependency(&self, package: &str) -> Result<bool, ExecutionError>;
}

pub fn validate_fragment(fragment: &Fragment) -> Result<(), ExecutionError> {
    if fragment.name.trim().is_empty() {
        return Err(ExecutionError::InvalidInput(
            "function name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn package_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s#]\S*$").expect("package pattern is valid"))
}

/// A package identifier occupies exactly one line of the dependency file.
pub fn validate_package(package: &str) -> Result<(), ExecutionError> {
    if !package_pattern().is_match(package) {
        return Err(ExecutionError::InvalidInput(format!(
            "invalid package identifier '{}'",
            package
        )));
    }
    Ok(())
}

pub(crate) fn upsert_into(fragments: &mut Vec<Fragment>, fragment: Fragment) -> UpsertOutcome {
    match fragments.iter_mut().find(|f| f.name == fragment.name) {
        Some(existing) => {
            existing.code = fragment.code;
            UpsertOutcome::Updated
        }
        None => {
            fragments.push(fragment);
            UpsertOutcome::Added
        }
    }
}

pub(crate) fn upsert_all_into(fragments: &mut Vec<Fragment>, batch: Vec<Fragment>) {
    for fragment in batch {
        upsert_into(fragments, fragment);
    }
}

pub(crate) fn add_into(packages: &mut Vec<String>, package: &str) -> bool {
    if packages.iter().any(|p| p == package) {
        return false;
    }
    packages.push(package.to_string());
    true
}

pub(crate) fn remove_from(packages: &mut Vec<String>, package: &str) -> bool {
    match packages.iter().position(|p| p == package) {
        Some(index) => {
            packages.remove(index);
            true
        }
        None => false,
    }
}

//! In-memory registry, used when persistence is not wanted (tests, one-shot
//! CLI runs seeded from a file).

use super::{
    add_into, remove_from, upsert_all_into, upsert_into, validate_fragment, validate_package,
    Fragment, RegistryStore, UpsertOutcome,
};
use crate::errors::ExecutionError;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryRegistry {
    fragments: RwLock<Vec<Fragment>>,
    dependencies: RwLock<Vec<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fragments(fragments: Vec<Fragment>) -> Self {
        Self {
            fragments: RwLock::new(fragments),
            dependencies: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn list_fragments(&self) -> Result<Vec<Fragment>, ExecutionError> {
        Ok(self.fragments.read().await.clone())
    }

    async fn upsert_fragment(&self, fragment: Fragment) -> Result<UpsertOutcome, ExecutionError> {
        validate_fragment(&fragment)?;
        Ok(upsert_into(&mut *self.fragments.write().await, fragment))
    }

    async fn upsert_fragments(&self, batch: Vec<Fragment>) -> Result<(), ExecutionError> {
        for fragment in &batch {
            validate_fragment(fragment)?;
        }
        upsert_all_into(&mut *self.fragments.write().await, batch);
        Ok(())
    }

    async fn list_dependencies(&self) -> Result<Vec<String>, ExecutionError> {
        Ok(self.dependencies.read().await.clone())
    }

    async fn add_dependency(&self, package: &str) -> Result<bool, ExecutionError> {
        validate_package(package)?;
        Ok(add_into(&mut *self.dependencies.write().await, package))
    }

    async fn add_dependencies(&self, batch: Vec<String>) -> Result<(), ExecutionError> {
        for package in &batch {
            validate_package(package)?;
        }
        let mut dependencies = self.dependencies.write().await;
        for package in &batch {
            add_into(&mut dependencies, package);
        }
        Ok(())
    }

    async fn remove_dependency(&self, package: &str) -> Result<bool, ExecutionError> {
        Ok(remove_from(&mut *self.dependencies.write().await, package))
    }
}

//! File-backed registry: fragments as a JSON array, dependencies as a
//! line-delimited requirements file.

use super::{
    add_into, remove_from, upsert_all_into, upsert_into, validate_fragment, validate_package,
    Fragment, RegistryStore, UpsertOutcome,
};
use crate::errors::ExecutionError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

pub const FUNCTIONS_FILE: &str = "functions.json";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

pub struct FileRegistry {
    functions_path: PathBuf,
    requirements_path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(functions_path: impl Into<PathBuf>, requirements_path: impl Into<PathBuf>) -> Self {
        Self {
            functions_path: functions_path.into(),
            requirements_path: requirements_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Registry rooted at `data_dir` using the default file names.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self::new(
            data_dir.join(FUNCTIONS_FILE),
            data_dir.join(REQUIREMENTS_FILE),
        )
    }

    pub fn functions_path(&self) -> &Path {
        &self.functions_path
    }

    pub fn requirements_path(&self) -> &Path {
        &self.requirements_path
    }

    async fn load_fragments(&self) -> Result<Vec<Fragment>, ExecutionError> {
        match fs::read_to_string(&self.functions_path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "No data found at {}, returning empty",
                    self.functions_path.display()
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_fragments(&self, fragments: &[Fragment]) -> Result<(), ExecutionError> {
        let content = serde_json::to_string(fragments)?;
        replace_file(&self.functions_path, content).await?;
        log::info!("Data saved to {}", self.functions_path.display());
        Ok(())
    }

    async fn load_requirements(&self) -> Result<Vec<String>, ExecutionError> {
        match fs::read_to_string(&self.requirements_path).await {
            Ok(content) => Ok(parse_requirements(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No requirements file found, returning empty list");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_requirements(&self, packages: &[String]) -> Result<(), ExecutionError> {
        replace_file(&self.requirements_path, packages.join("\n")).await?;
        log::info!("Requirements saved: {:?}", packages);
        Ok(())
    }
}

/// One package per non-blank line.
pub fn parse_requirements(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Writes `content` to a sibling temp file and renames it over `path`, so
/// readers observe either the previous contents or the new ones.
async fn replace_file(path: &Path, content: String) -> Result<(), ExecutionError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<(), ExecutionError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;
        let mut file = tempfile::NamedTempFile::new_in(&parent)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ExecutionError::Io(format!("registry write task failed: {}", e)))?
}

#[async_trait]
impl RegistryStore for FileRegistry {
    async fn list_fragments(&self) -> Result<Vec<Fragment>, ExecutionError> {
        self.load_fragments().await
    }

    async fn upsert_fragment(&self, fragment: Fragment) -> Result<UpsertOutcome, ExecutionError> {
        validate_fragment(&fragment)?;
        let _guard = self.write_lock.lock().await;
        let mut fragments = self.load_fragments().await?;
        let outcome = upsert_into(&mut fragments, fragment);
        self.save_fragments(&fragments).await?;
        Ok(outcome)
    }

    async fn upsert_fragments(&self, batch: Vec<Fragment>) -> Result<(), ExecutionError> {
        for fragment in &batch {
            validate_fragment(fragment)?;
        }
        let _guard = self.write_lock.lock().await;
        let mut fragments = self.load_fragments().await?;
        upsert_all_into(&mut fragments, batch);
        self.save_fragments(&fragments).await
    }

    async fn list_dependencies(&self) -> Result<Vec<String>, ExecutionError> {
        self.load_requirements().await
    }

    async fn add_dependency(&self, package: &str) -> Result<bool, ExecutionError> {
        validate_package(package)?;
        let _guard = self.write_lock.lock().await;
        let mut packages = self.load_requirements().await?;
        if !add_into(&mut packages, package) {
            return Ok(false);
        }
        self.save_requirements(&packages).await?;
        Ok(true)
    }

    async fn add_dependencies(&self, batch: Vec<String>) -> Result<(), ExecutionError> {
        for package in &batch {
            validate_package(package)?;
        }
        let _guard = self.write_lock.lock().await;
        let mut packages = self.load_requirements().await?;
        for package in &batch {
            add_into(&mut packages, package);
        }
        self.save_requirements(&packages).await
    }

    async fn remove_dependency(&self, package: &str) -> Result<bool, ExecutionError> {
        let _guard = self.write_lock.lock().await;
        let mut packages = self.load_requirements().await?;
        if !remove_from(&mut packages, package) {
            return Ok(false);
        }
        self.save_requirements(&packages).await?;
        Ok(true)
    }
}

//! Prompt Loader - Load and cache template sources relative to a flow directory
//!
//! Nodes reference their prompt templates by a path relative to the flow's
//! working directory. Several nodes may share one file, so loaded sources are
//! cached for the lifetime of the loader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{FlowError, Result};

/// Loads and caches template sources from a flow's working directory
pub struct PromptLoader {
    /// Directory that relative source paths are resolved against
    working_dir: PathBuf,
    /// In-memory cache keyed by the relative path
    cache: RwLock<HashMap<String, String>>,
}

impl PromptLoader {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a template source and cache it
    ///
    /// # Arguments
    /// * `relative_path` - Path relative to the working directory (absolute paths are used as is)
    pub fn load(&self, relative_path: &str) -> Result<String> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|e| FlowError::Template(format!("Failed to acquire read lock: {}", e)))?;
            if let Some(content) = cache.get(relative_path) {
                return Ok(content.clone());
            }
        }

        let path = self.source_path(relative_path);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            FlowError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to load template from {:?}: {}", path, e),
            ))
        })?;
        log::debug!("Loaded template source {}", path.display());

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|e| FlowError::Template(format!("Failed to acquire write lock: {}", e)))?;
            cache.insert(relative_path.to_string(), content.clone());
        }

        Ok(content)
    }

    /// Check if a source file exists
    pub fn exists(&self, relative_path: &str) -> bool {
        self.source_path(relative_path).is_file()
    }

    /// Full path of a source file
    pub fn source_path(&self, relative_path: &str) -> PathBuf {
        self.working_dir.join(relative_path)
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_loader() -> (PromptLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let loader = PromptLoader::new(temp_dir.path());
        (loader, temp_dir)
    }

    #[test]
    fn test_new_loader() {
        let (loader, temp_dir) = create_test_loader();
        assert_eq!(loader.working_dir(), temp_dir.path());
    }

    #[test]
    fn test_load_source() {
        let (loader, temp_dir) = create_test_loader();
        fs::write(temp_dir.path().join("prompt.jinja2"), "Hello {{name}}!").unwrap();

        assert!(loader.exists("prompt.jinja2"));
        assert_eq!(loader.load("prompt.jinja2").unwrap(), "Hello {{name}}!");
    }

    #[test]
    fn test_load_nested_path() {
        let (loader, temp_dir) = create_test_loader();
        fs::create_dir_all(temp_dir.path().join("prompts")).unwrap();
        fs::write(temp_dir.path().join("prompts/system.md"), "System").unwrap();

        assert_eq!(loader.load("prompts/system.md").unwrap(), "System");
    }

    #[test]
    fn test_load_caches_source() {
        let (loader, temp_dir) = create_test_loader();
        let path = temp_dir.path().join("t.md");
        fs::write(&path, "Original content").unwrap();
        assert_eq!(loader.load("t.md").unwrap(), "Original content");

        fs::write(&path, "Modified content").unwrap();
        assert_eq!(loader.load("t.md").unwrap(), "Original content");
    }

    #[test]
    fn test_load_missing() {
        let (loader, _temp_dir) = create_test_loader();
        assert!(!loader.exists("missing.md"));
        assert!(matches!(loader.load("missing.md"), Err(FlowError::Io(_))));
    }

    #[test]
    fn test_directory_is_not_a_source() {
        let (loader, temp_dir) = create_test_loader();
        fs::create_dir_all(temp_dir.path().join("dir")).unwrap();
        assert!(!loader.exists("dir"));
    }
}

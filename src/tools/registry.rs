//! Package tool registry
//!
//! The registry answers "which package tools exist and what do they look like".
//! Manifests are YAML (or JSON) maps of identifier to tool definition.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{FlowError, Result};

use super::definition::ToolDefinition;

/// Source of package tool metadata.
///
/// `collect` returns every known tool when `keys` is `None`, otherwise only the
/// requested ones. Missing identifiers are simply absent from the result, and
/// entries may carry no definition. Results are ordered by identifier.
pub trait PackageToolRegistry: Send + Sync {
    fn collect(&self, keys: Option<&BTreeSet<String>>) -> BTreeMap<String, Option<ToolDefinition>>;
}

impl<F> PackageToolRegistry for F
where
    F: Fn(Option<&BTreeSet<String>>) -> BTreeMap<String, Option<ToolDefinition>> + Send + Sync,
{
    fn collect(&self, keys: Option<&BTreeSet<String>>) -> BTreeMap<String, Option<ToolDefinition>> {
        self(keys)
    }
}

/// Registry of definitions loaded from manifest files
#[derive(Debug, Clone, Default)]
pub struct ManifestRegistry {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ManifestRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut registry = Self::new();
        registry.load_file(path)?;
        Ok(registry)
    }

    /// Load a manifest from a YAML (or JSON) string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let mut registry = Self::new();
        registry.load_yaml(content)?;
        Ok(registry)
    }

    /// Merge a manifest file into this registry; later entries win
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| FlowError::Manifest(format!("Failed to read {}: {}", path.display(), e)))?;
        let manifest =
            parse_manifest(&content).map_err(|e| FlowError::Manifest(format!("{}: {}", path.display(), e)))?;
        let count = manifest.len();
        self.tools.extend(manifest);
        log::debug!("Loaded {} package tools from {}", count, path.display());
        Ok(count)
    }

    /// Merge every manifest matching a glob pattern
    pub fn load_glob(&mut self, pattern: &str) -> Result<usize> {
        let paths = glob::glob(pattern)
            .map_err(|e| FlowError::Manifest(format!("Invalid manifest pattern '{}': {}", pattern, e)))?;
        let mut count = 0;
        for entry in paths {
            let path = entry.map_err(|e| FlowError::Manifest(format!("Failed to read manifest path: {}", e)))?;
            if path.is_file() {
                count += self.load_file(&path)?;
            }
        }
        Ok(count)
    }

    /// Merge a manifest string into this registry
    pub fn load_yaml(&mut self, content: &str) -> Result<usize> {
        let manifest =
            parse_manifest(content).map_err(|e| FlowError::Manifest(format!("Failed to parse manifest: {}", e)))?;
        let count = manifest.len();
        self.tools.extend(manifest);
        Ok(count)
    }

    /// Add a definition under its computed identifier
    pub fn add(&mut self, definition: ToolDefinition) {
        self.tools.insert(definition.identifier(), definition);
    }

    /// Add a definition under an explicit identifier
    pub fn insert(&mut self, identifier: impl Into<String>, definition: ToolDefinition) {
        self.tools.insert(identifier.into(), definition);
    }

    /// Merge another registry into this one
    pub fn extend(&mut self, other: ManifestRegistry) {
        self.tools.extend(other.tools);
    }

    pub fn get(&self, identifier: &str) -> Option<&ToolDefinition> {
        self.tools.get(identifier)
    }

    /// All identifiers, sorted
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.tools.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn parse_manifest(content: &str) -> std::result::Result<BTreeMap<String, ToolDefinition>, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_yaml::from_str(content)
}

impl PackageToolRegistry for ManifestRegistry {
    fn collect(&self, keys: Option<&BTreeSet<String>>) -> BTreeMap<String, Option<ToolDefinition>> {
        self.tools
            .iter()
            .filter(|(id, _)| keys.is_none_or(|keys| keys.contains(id.as_str())))
            .map(|(id, def)| (id.clone(), Some(def.clone())))
            .collect()
    }
}

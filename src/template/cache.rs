//! Read-through cache of loaded templates

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::ParseError;

use super::model::Template;

/// Concurrent cache of parsed templates keyed by source path
///
/// Sits in front of the loader so the same file is parsed once; rendering
/// never goes through it. Cached templates are shared as `Arc<Template>` and
/// are immutable, so any number of threads can render from them at once.
#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: RwLock<HashMap<PathBuf, Arc<Template>>>,
    /// Base path for resolving relative file paths
    base_path: Option<PathBuf>,
}

impl TemplateCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache that resolves relative paths against `base_path`
    pub fn with_base_path(base_path: PathBuf) -> Self {
        Self {
            templates: RwLock::default(),
            base_path: Some(base_path),
        }
    }

    pub fn base_path(&self) -> Option<&PathBuf> {
        self.base_path.as_ref()
    }

    /// Resolve a path relative to the base path
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Return the cached template for `path`, loading it on first use
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<Template>, ParseError> {
        let full_path = self.resolve_path(path.as_ref());
        if let Some(template) = self.read().get(&full_path) {
            return Ok(Arc::clone(template));
        }

        debug!(path = %full_path.display(), "loading template");
        let template = Arc::new(Template::from_yaml_file(&full_path)?);
        // Another thread may have loaded it meanwhile; keep the first copy
        let mut templates = self.write();
        Ok(Arc::clone(templates.entry(full_path).or_insert(template)))
    }

    /// Get a cached template without loading
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<Template>> {
        let full_path = self.resolve_path(path.as_ref());
        self.read().get(&full_path).cloned()
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.get(path).is_some()
    }

    /// Drop a cached entry so the next load re-reads the file
    pub fn invalidate(&self, path: impl AsRef<Path>) -> bool {
        let full_path = self.resolve_path(path.as_ref());
        self.write().remove(&full_path).is_some()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, Arc<Template>>> {
        self.templates.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, Arc<Template>>> {
        self.templates.write().unwrap_or_else(PoisonError::into_inner)
    }
}

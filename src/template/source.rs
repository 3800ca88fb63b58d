//! Backing stores that supply raw template text by name

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors a backing store can report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("template not found: {name}")]
    NotFound { name: String },

    #[error("error reading template {name}: {message}")]
    Io { name: String, message: String },

    #[error("fetching template {name} timed out after {after:?}")]
    Timeout { name: String, after: Duration },
}

impl SourceError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}

/// Asynchronous name -> text lookup
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<String, SourceError>;
}

/// In-memory template store
///
/// Keeps a per-name count of fetches, which makes request coalescing
/// observable.
#[derive(Debug, Default)]
pub struct MemorySource {
    templates: HashMap<String, String>,
    fetches: Mutex<HashMap<String, usize>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    /// Number of times `name` has been fetched
    pub fn fetch_count(&self, name: &str) -> usize {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TemplateSource for MemorySource {
    async fn fetch(&self, name: &str) -> Result<String, SourceError> {
        *self
            .fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default() += 1;

        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::not_found(name))
    }
}

/// Template store backed by files under a root directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a template name to a path below the root
    ///
    /// Names that would escape the root resolve to nothing.
    pub fn resolve_path(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if contained && !name.is_empty() {
            Some(self.root.join(relative))
        } else {
            None
        }
    }
}

#[async_trait]
impl TemplateSource for DirectorySource {
    async fn fetch(&self, name: &str) -> Result<String, SourceError> {
        let path = self
            .resolve_path(name)
            .ok_or_else(|| SourceError::not_found(name))?;

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SourceError::not_found(name),
                _ => SourceError::Io {
                    name: name.to_string(),
                    message: e.to_string(),
                },
            })
    }
}

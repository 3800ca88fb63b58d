//! Template registry: caching, coalesced loading and dependency gating
//!
//! Every template name maps to one entry. The first request for a name
//! spawns a single load task (fetch, compile, resolve ancestor); every other
//! request made before the entry settles queues a waiter on it. An entry
//! keeps a count of outstanding work: one tick for its own compilation, one
//! for an unresolved `extends` ancestor and one per armed [`Gate`]. When the
//! count reaches zero the entry becomes ready and its waiters are completed
//! in the order they were registered.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::config::EngineConfig;
use crate::error::ParseError;
use crate::expr::Variables;
use crate::parser::{parse_with, CompiledTemplate};
use crate::renderer::render_template;

use super::resolver::Template;
use super::source::{SourceError, TemplateSource};

/// Broad category of a template failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Structure,
    Dependency,
}

/// Errors that can occur while loading or rendering a template
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Template text failed to compile
    #[error("failed to compile template '{name}': {source}")]
    Parse { name: String, source: ParseError },

    /// Backing store could not supply the template
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A template (indirectly) extends itself
    #[error("circular extends: {}", chain.join(" -> "))]
    CircularExtends { chain: Vec<String> },

    /// An ancestor in the extends chain failed to load
    #[error("ancestor '{ancestor}' of template '{name}' failed: {cause}")]
    Ancestor {
        name: String,
        ancestor: String,
        cause: Box<TemplateError>,
    },

    /// The load task went away without settling the entry
    #[error("loading template '{name}' was interrupted")]
    Interrupted { name: String },
}

impl TemplateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TemplateError::Parse {
                source: ParseError::Syntax { .. },
                ..
            } => ErrorKind::Syntax,
            TemplateError::Parse {
                source: ParseError::Structure { .. },
                ..
            } => ErrorKind::Structure,
            _ => ErrorKind::Dependency,
        }
    }

    pub fn is_dependency_error(&self) -> bool {
        self.kind() == ErrorKind::Dependency
    }

    /// The innermost failure behind a chain of ancestor errors
    pub fn root_cause(&self) -> &TemplateError {
        let mut current = self;
        while let TemplateError::Ancestor { cause, .. } = current {
            current = cause;
        }
        current
    }
}

/// Observable lifecycle state of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Loading,
    Ready,
    Failed,
}

type LoadResult = Result<Arc<Template>, TemplateError>;

#[derive(Debug)]
enum Status {
    Loading,
    Ready(Arc<Template>),
    Failed(TemplateError),
}

#[derive(Debug)]
struct Entry {
    status: Status,
    /// Outstanding ticks before the entry may become ready
    pending: usize,
    waiters: Vec<oneshot::Sender<LoadResult>>,
    compiled: Option<CompiledTemplate>,
    /// Declared ancestor name, recorded for cycle detection
    extends: Option<String>,
    parent: Option<Arc<Template>>,
}

impl Entry {
    fn loading(pending: usize) -> Self {
        Self {
            status: Status::Loading,
            pending,
            waiters: Vec::new(),
            compiled: None,
            extends: None,
            parent: None,
        }
    }
}

struct Inner {
    source: Arc<dyn TemplateSource>,
    config: EngineConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

/// Cache of compiled templates, loaded on demand from a [`TemplateSource`]
///
/// Cloning a registry is cheap and yields a handle to the same cache. Loads
/// run on the tokio runtime, so the registry must be used from within one.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .field("entries", &self.entries().len())
            .finish()
    }
}

impl Registry {
    /// Create a registry with default configuration
    pub fn new<S: TemplateSource + 'static>(source: S) -> Self {
        Self::with_config(source, EngineConfig::default())
    }

    pub fn with_config<S: TemplateSource + 'static>(source: S, config: EngineConfig) -> Self {
        Self::from_shared(Arc::new(source), config)
    }

    /// Create a registry over a source the caller keeps a handle to
    pub fn from_shared(source: Arc<dyn TemplateSource>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                config,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Get a template once it and its whole ancestor chain are loaded
    pub async fn get(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        let waiter = self.subscribe(name);
        waiter.await.unwrap_or_else(|_| {
            Err(TemplateError::Interrupted {
                name: name.to_string(),
            })
        })
    }

    /// Load a template and render it against `variables`
    pub async fn render(&self, name: &str, variables: Variables) -> Result<String, TemplateError> {
        let template = self.get(name).await?;
        Ok(render_template(&template, variables))
    }

    /// Hold `name` back from becoming ready until the returned gate is released
    ///
    /// Starts loading the template if it is not known yet. Gating an entry
    /// that has already settled returns an inert gate.
    pub fn get_with_extra_gate(&self, name: &str) -> Gate {
        let mut entries = self.entries();
        let (armed, created) = match entries.get_mut(name) {
            Some(entry) if matches!(entry.status, Status::Loading) => {
                entry.pending += 1;
                (true, false)
            }
            Some(_) => (false, false),
            None => {
                entries.insert(name.to_string(), Entry::loading(2));
                (true, true)
            }
        };
        drop(entries);

        if created {
            self.spawn_load(name);
        }
        Gate {
            registry: self.clone(),
            name: name.to_string(),
            armed,
        }
    }

    /// Current state of the entry for `name`, if it has been requested
    pub fn state(&self, name: &str) -> Option<EntryState> {
        self.entries().get(name).map(|entry| match entry.status {
            Status::Loading => EntryState::Loading,
            Status::Ready(_) => EntryState::Ready,
            Status::Failed(_) => EntryState::Failed,
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `name`, starting its load if it is unknown
    fn subscribe(&self, name: &str) -> oneshot::Receiver<LoadResult> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries();
        let created = match entries.get_mut(name) {
            Some(entry) => {
                match &entry.status {
                    Status::Loading => entry.waiters.push(tx),
                    Status::Ready(template) => {
                        let _ = tx.send(Ok(template.clone()));
                    }
                    Status::Failed(error) => {
                        let _ = tx.send(Err(error.clone()));
                    }
                }
                false
            }
            None => {
                let mut entry = Entry::loading(1);
                entry.waiters.push(tx);
                entries.insert(name.to_string(), entry);
                true
            }
        };
        drop(entries);

        if created {
            self.spawn_load(name);
        }
        rx
    }

    fn spawn_load(&self, name: &str) {
        let registry = self.clone();
        let name = name.to_string();
        tokio::spawn(async move { registry.load(name).await });
    }

    async fn load(self, name: String) {
        tracing::debug!(template = %name, "fetching template");
        let raw = match self.fetch(&name).await {
            Ok(raw) => raw,
            Err(err) => return self.fail(&name, err.into()),
        };

        let compiled = match parse_with(&raw, &self.inner.config.parse_options()) {
            Ok(compiled) => compiled,
            Err(source) => {
                let error = TemplateError::Parse {
                    name: name.clone(),
                    source,
                };
                return self.fail(&name, error);
            }
        };
        let parent = compiled.extends.clone();

        {
            let mut entries = self.entries();
            if let Some(parent) = &parent {
                if let Some(chain) = find_cycle(&entries, &name, parent) {
                    drop(entries);
                    return self.fail(&name, TemplateError::CircularExtends { chain });
                }
            }
            if let Some(entry) = entries.get_mut(&name) {
                if let Some(parent) = &parent {
                    entry.pending += 1;
                    entry.extends = Some(parent.clone());
                }
                entry.compiled = Some(compiled);
            }
        }
        tracing::debug!(template = %name, extends = ?parent, "template compiled");
        self.countdown(&name);

        let Some(parent) = parent else {
            return;
        };
        match self.subscribe(&parent).await {
            Ok(Ok(template)) => {
                if let Some(entry) = self.entries().get_mut(&name) {
                    entry.parent = Some(template);
                }
                self.countdown(&name);
            }
            Ok(Err(cause)) => {
                let error = TemplateError::Ancestor {
                    name: name.clone(),
                    ancestor: parent,
                    cause: Box::new(cause),
                };
                self.fail(&name, error);
            }
            Err(_) => self.fail(&name, TemplateError::Interrupted { name: parent }),
        }
    }

    async fn fetch(&self, name: &str) -> Result<String, SourceError> {
        let fetch = self.inner.source.fetch(name);
        match self.inner.config.fetch_timeout() {
            Some(after) => tokio::time::timeout(after, fetch)
                .await
                .unwrap_or_else(|_| {
                    Err(SourceError::Timeout {
                        name: name.to_string(),
                        after,
                    })
                }),
            None => fetch.await,
        }
    }

    /// Release one pending tick; the entry becomes ready when none remain
    fn countdown(&self, name: &str) {
        let (template, waiters) = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(name) else {
                return;
            };
            entry.pending = entry.pending.saturating_sub(1);
            if entry.pending > 0 || !matches!(entry.status, Status::Loading) {
                return;
            }
            let Some(compiled) = entry.compiled.take() else {
                return;
            };

            let template = Arc::new(Template::new(name, compiled, entry.parent.take()));
            entry.status = Status::Ready(template.clone());
            (template, std::mem::take(&mut entry.waiters))
        };

        tracing::debug!(template = name, waiters = waiters.len(), "template ready");
        for waiter in waiters {
            let _ = waiter.send(Ok(template.clone()));
        }
    }

    /// Settle an entry as failed and reject all of its waiters
    fn fail(&self, name: &str, error: TemplateError) {
        let waiters = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(name) else {
                return;
            };
            if !matches!(entry.status, Status::Loading) {
                return;
            }
            entry.status = Status::Failed(error.clone());
            entry.compiled = None;
            entry.parent = None;
            std::mem::take(&mut entry.waiters)
        };

        tracing::debug!(template = name, error = %error, waiters = waiters.len(), "template failed");
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
    }
}

/// Walk recorded `extends` edges from `parent`; a walk that arrives back at
/// `name` is a cycle, returned as the chain of names visited
fn find_cycle(entries: &HashMap<String, Entry>, name: &str, parent: &str) -> Option<Vec<String>> {
    let mut chain = vec![name.to_string()];
    let mut visited = HashSet::from([name]);
    let mut current = parent;
    loop {
        chain.push(current.to_string());
        if current == name {
            return Some(chain);
        }
        if !visited.insert(current) {
            return None;
        }
        current = entries.get(current)?.extends.as_deref()?;
    }
}

/// A manual hold on a registry entry
///
/// While armed, the entry cannot become ready. The hold is released by
/// [`Gate::release`] or when the gate is dropped, whichever comes first.
#[must_use = "the template stays pending until the gate is released"]
#[derive(Debug)]
pub struct Gate {
    registry: Registry,
    name: String,
    armed: bool,
}

impl Gate {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this gate is actually holding its entry back
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        if std::mem::take(&mut self.armed) {
            self.registry.countdown(&self.name);
        }
    }
}

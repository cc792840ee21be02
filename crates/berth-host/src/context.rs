//! Per-artifact loading contexts and their process-wide registry.
//!
//! Each external artifact gets exactly one [`LoadingContext`], the
//! isolation boundary for code the artifact introduces. Symbols exported
//! by the host remain visible to the plugin through the process image;
//! symbols the artifact brings along live and die with its context.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use libloading::Library;

/// Identifier of a loading context, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Raw numeric id.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Isolation boundary for one artifact.
///
/// Owns the native library loaded from the artifact, keeping its symbols
/// alive for as long as the context is registered. Contexts are never
/// released implicitly; see [`ContextRegistry::release`].
pub struct LoadingContext {
    id: ContextId,
    artifact: PathBuf,
    library: Mutex<Option<Library>>,
}

impl LoadingContext {
    fn new(id: ContextId, artifact: PathBuf) -> Self {
        Self {
            id,
            artifact,
            library: Mutex::new(None),
        }
    }

    /// This context's identifier.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// The artifact location this context is bound to.
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Take ownership of the artifact's library so its symbols outlive
    /// the discovery call that resolved them.
    pub fn adopt_library(&self, library: Library) {
        let mut guard = self.library.lock().expect("context library lock poisoned");
        *guard = Some(library);
    }

    /// Whether a library is currently held by this context.
    pub fn holds_library(&self) -> bool {
        self.library
            .lock()
            .expect("context library lock poisoned")
            .is_some()
    }
}

impl std::fmt::Debug for LoadingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingContext")
            .field("id", &self.id)
            .field("artifact", &self.artifact)
            .field("holds_library", &self.holds_library())
            .finish()
    }
}

/// Append-mostly registry of every loading context created by the host.
///
/// Insertion order is preserved so enumeration reflects the order in
/// which artifacts were first seen. Safe for concurrent scan
/// invocations.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    next_id: AtomicU64,
    entries: Mutex<IndexMap<ContextId, Arc<LoadingContext>>>,
}

impl ContextRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh context bound to the given artifact and track it.
    pub fn create(&self, artifact: impl Into<PathBuf>) -> Arc<LoadingContext> {
        let id = ContextId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let context = Arc::new(LoadingContext::new(id, artifact.into()));
        let mut entries = self.entries.lock().expect("context registry lock poisoned");
        entries.insert(id, context.clone());
        context
    }

    /// Look up a context by id.
    pub fn get(&self, id: ContextId) -> Option<Arc<LoadingContext>> {
        let entries = self.entries.lock().expect("context registry lock poisoned");
        entries.get(&id).cloned()
    }

    /// Enumerate tracked contexts in creation order.
    pub fn contexts(&self) -> Vec<Arc<LoadingContext>> {
        let entries = self.entries.lock().expect("context registry lock poisoned");
        entries.values().cloned().collect()
    }

    /// Explicitly release a context, dropping its library once the last
    /// outstanding handle goes away. Returns whether the id was tracked.
    pub fn release(&self, id: ContextId) -> bool {
        let mut entries = self.entries.lock().expect("context registry lock poisoned");
        entries.shift_remove(&id).is_some()
    }

    /// Number of tracked contexts.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("context registry lock poisoned")
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! The contract an embedding front-end implements for the host engine.
//!
//! The engine consumes these interfaces and nothing else from the
//! front-end: filesystem roots, opaque storage handles, and a login
//! solver factory. Their implementations live entirely outside the
//! engine.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::plugin::HookError;

/// Solves login challenges on behalf of a connecting requester.
pub trait LoginSolver: Send + Sync {
    /// Produce an answer for the given challenge.
    fn solve(&self, requester: u64, challenge: &str) -> Result<String, HookError>;
}

/// Opaque key-value storage handle scoped per plugin.
pub trait DataStorage: Send + Sync {
    /// Load a value for a plugin, if present.
    fn load(&self, plugin: &str, key: &str) -> io::Result<Option<String>>;

    /// Store a value for a plugin.
    fn store(&self, plugin: &str, key: &str, value: &str) -> io::Result<()>;
}

/// The four storage handles the front-end provides: data and config,
/// separately for artifact-backed plugins and for built-ins.
#[derive(Clone)]
pub struct StorageSet {
    pub data_for_artifacts: Arc<dyn DataStorage>,
    pub config_for_artifacts: Arc<dyn DataStorage>,
    pub data_for_builtins: Arc<dyn DataStorage>,
    pub config_for_builtins: Arc<dyn DataStorage>,
}

impl StorageSet {
    /// Build a set backed by a single shared handle.
    pub fn uniform(storage: Arc<dyn DataStorage>) -> Self {
        Self {
            data_for_artifacts: storage.clone(),
            config_for_artifacts: storage.clone(),
            data_for_builtins: storage.clone(),
            config_for_builtins: storage,
        }
    }
}

impl std::fmt::Debug for StorageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageSet { .. }")
    }
}

/// Implemented by the embedding front-end, consumed by the host engine.
pub trait HostImplementation: Send + Sync {
    /// Root directory the host runs in.
    fn root_path(&self) -> &Path;

    /// The storage handles plugins persist through.
    fn storage(&self) -> StorageSet;

    /// Create a login solver for the given requester.
    fn create_login_solver(&self, requester: u64) -> Arc<dyn LoginSolver>;
}

/// A [`DataStorage`] writing one JSON document per plugin under a base
/// directory. Values are cached in memory and flushed on every store.
pub struct JsonFileStorage {
    base_dir: PathBuf,
    cache: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl JsonFileStorage {
    /// Create a storage rooted at `base_dir`, creating it if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn file_for(&self, plugin: &str) -> PathBuf {
        self.base_dir.join(format!("{plugin}.json"))
    }

    fn read_document(&self, plugin: &str) -> io::Result<HashMap<String, String>> {
        let path = self.file_for(plugin);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(io::Error::other)
    }
}

impl DataStorage for JsonFileStorage {
    fn load(&self, plugin: &str, key: &str) -> io::Result<Option<String>> {
        let mut cache = self.cache.lock().expect("storage cache lock poisoned");
        if !cache.contains_key(plugin) {
            let doc = self.read_document(plugin)?;
            cache.insert(plugin.to_string(), doc);
        }
        Ok(cache
            .get(plugin)
            .and_then(|doc| doc.get(key))
            .cloned())
    }

    fn store(&self, plugin: &str, key: &str, value: &str) -> io::Result<()> {
        let mut cache = self.cache.lock().expect("storage cache lock poisoned");
        let mut doc = match cache.get(plugin) {
            Some(doc) => doc.clone(),
            None => self.read_document(plugin)?,
        };
        doc.insert(key.to_string(), value.to_string());
        let serialized = serde_json::to_string_pretty(&doc).map_err(io::Error::other)?;
        // The cache must never get ahead of disk: commit it only once
        // the document is persisted.
        std::fs::write(self.file_for(plugin), serialized)?;
        cache.insert(plugin.to_string(), doc);
        Ok(())
    }
}

//! Provider discovery mechanisms.
//!
//! A [`ProviderDiscovery`] answers one question: which plugin instances
//! are visible in a given loading context? Two mechanisms ship with the
//! host: an explicit in-process registration table and a native
//! dynamic-library loader driven by `plugin.toml` manifests. Embedders
//! may add their own.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use libloading::{Library, Symbol};
use serde::Deserialize;

use berth_core::{ContextError, HookError, PluginInstance};

use crate::context::LoadingContext;

/// Entry symbol an artifact library must export.
pub const PLUGIN_ENTRY_SYMBOL: &str = "berth_plugin_entry";

/// Signature of the artifact entry point.
pub type PluginEntry = fn() -> Vec<PluginInstance>;

/// A pluggable "find all plugin instances visible here" primitive.
pub trait ProviderDiscovery: Send + Sync {
    /// Mechanism name, used in log output.
    fn name(&self) -> &'static str;

    /// Whether this mechanism can interpret external artifacts.
    fn handles_artifacts(&self) -> bool;

    /// Realize every instance visible in the given context.
    ///
    /// `None` means the in-process pass: no artifact, host symbols only.
    /// An `Err` fails the whole context; mechanisms that can isolate
    /// individual provider failures should log and skip them instead.
    fn discover(
        &self,
        context: Option<&LoadingContext>,
    ) -> Result<Vec<Arc<PluginInstance>>, ContextError>;
}

type ProviderFn = Box<dyn Fn() -> Result<PluginInstance, HookError> + Send + Sync>;

/// Explicit in-process registration table.
///
/// Providers are closures registered before the host starts; no external
/// file is involved. A provider that errors is logged and skipped so the
/// rest of the table still realizes.
#[derive(Default)]
pub struct StaticRegistry {
    providers: Mutex<Vec<ProviderFn>>,
}

impl StaticRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider closure.
    pub fn register(
        &self,
        provider: impl Fn() -> Result<PluginInstance, HookError> + Send + Sync + 'static,
    ) {
        let mut providers = self.providers.lock().expect("provider table lock poisoned");
        providers.push(Box::new(provider));
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers
            .lock()
            .expect("provider table lock poisoned")
            .len()
    }

    /// Whether no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProviderDiscovery for StaticRegistry {
    fn name(&self) -> &'static str {
        "static-registry"
    }

    fn handles_artifacts(&self) -> bool {
        false
    }

    fn discover(
        &self,
        context: Option<&LoadingContext>,
    ) -> Result<Vec<Arc<PluginInstance>>, ContextError> {
        if context.is_some() {
            return Ok(vec![]);
        }

        let providers = self.providers.lock().expect("provider table lock poisoned");
        let mut instances = Vec::with_capacity(providers.len());
        for provider in providers.iter() {
            match provider() {
                Ok(instance) => instances.push(Arc::new(instance)),
                Err(error) => {
                    tracing::error!(%error, "in-process provider failed, skipping");
                }
            }
        }
        Ok(instances)
    }
}

/// Artifact manifest, read from `plugin.toml` inside the artifact
/// directory.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactManifest {
    /// Plugin name declared by the artifact.
    pub name: String,

    /// Plugin version declared by the artifact.
    #[serde(default = "default_version")]
    pub version: String,

    /// Library file name, relative to the artifact directory.
    pub library: PathBuf,

    /// Entry symbol override.
    #[serde(default = "default_entry_symbol")]
    pub entry_symbol: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_entry_symbol() -> String {
    PLUGIN_ENTRY_SYMBOL.to_string()
}

/// Native dynamic-library discovery.
///
/// Reads the artifact's manifest, loads the declared library inside the
/// artifact's loading context, and calls its entry symbol to realize the
/// instances it provides. The library is adopted by the context so the
/// instances' code stays mapped for the context's lifetime.
#[derive(Debug, Default)]
pub struct LibraryDiscovery;

impl LibraryDiscovery {
    /// Create the discovery.
    pub fn new() -> Self {
        Self
    }

    fn read_manifest(context: &LoadingContext) -> Result<ArtifactManifest, ContextError> {
        let path = context.artifact().join("plugin.toml");
        let raw = std::fs::read_to_string(&path).map_err(|source| ContextError::Io {
            path: path.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| ContextError::Manifest {
            path,
            message: e.to_string(),
        })
    }
}

impl ProviderDiscovery for LibraryDiscovery {
    fn name(&self) -> &'static str {
        "library"
    }

    fn handles_artifacts(&self) -> bool {
        true
    }

    fn discover(
        &self,
        context: Option<&LoadingContext>,
    ) -> Result<Vec<Arc<PluginInstance>>, ContextError> {
        let Some(context) = context else {
            // Nothing to do for the in-process pass.
            return Ok(vec![]);
        };

        let manifest = Self::read_manifest(context)?;
        let library_path = context.artifact().join(&manifest.library);
        if !library_path.exists() {
            return Err(ContextError::Io {
                path: library_path,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "declared library not found",
                ),
            });
        }

        // SAFETY: loading and calling a foreign artifact entry point is
        // inherently unsafe; the symbol signature is fixed by the host
        // ABI contract and validated against the manifest below.
        let library = unsafe { Library::new(&library_path) }.map_err(|e| {
            ContextError::Library {
                path: library_path.clone(),
                message: e.to_string(),
            }
        })?;

        let instances = {
            // SAFETY: the entry symbol type matches the published
            // `PluginEntry` contract.
            let entry: Symbol<'_, PluginEntry> = unsafe {
                library.get(manifest.entry_symbol.as_bytes()).map_err(|_| {
                    ContextError::EntrySymbol {
                        path: library_path.clone(),
                        symbol: manifest.entry_symbol.clone(),
                    }
                })?
            };
            entry()
        };

        if !instances
            .iter()
            .any(|i| i.descriptor().name == manifest.name)
        {
            tracing::warn!(
                artifact = %context.artifact().display(),
                manifest_name = %manifest.name,
                "no provided instance matches the manifest identity"
            );
        }

        // The symbols backing these instances must stay mapped.
        context.adopt_library(library);

        Ok(instances.into_iter().map(Arc::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use berth_core::{Plugin, PluginDescriptor};

    struct Fixture {
        descriptor: PluginDescriptor,
    }

    impl Plugin for Fixture {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }
    }

    fn fixture(name: &str) -> PluginInstance {
        PluginInstance::public(Arc::new(Fixture {
            descriptor: PluginDescriptor::in_process(name, "1.0.0"),
        }))
    }

    #[test]
    fn test_static_registry_realizes_in_registration_order() {
        let registry = StaticRegistry::new();
        registry.register(|| Ok(fixture("first")));
        registry.register(|| Ok(fixture("second")));

        let instances = registry.discover(None).unwrap();
        let names: Vec<&str> = instances
            .iter()
            .map(|i| i.descriptor().name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_static_registry_skips_failing_provider() {
        let registry = StaticRegistry::new();
        registry.register(|| Ok(fixture("ok")));
        registry.register(|| Err("constructor exploded".into()));
        registry.register(|| Ok(fixture("also-ok")));

        let instances = registry.discover(None).unwrap();
        assert_eq!(instances.len(), 2);
    }

    #[test]
    fn test_static_registry_ignores_artifact_contexts() {
        let registry = StaticRegistry::new();
        registry.register(|| Ok(fixture("ok")));

        let contexts = crate::context::ContextRegistry::new();
        let ctx = contexts.create("/nowhere");
        assert!(registry.discover(Some(&ctx)).unwrap().is_empty());
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest: ArtifactManifest =
            toml::from_str("name = \"demo\"\nlibrary = \"libdemo.so\"").unwrap();
        assert_eq!(manifest.version, "0.1.0");
        assert_eq!(manifest.entry_symbol, PLUGIN_ENTRY_SYMBOL);
    }

    #[test]
    fn test_library_discovery_rejects_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let contexts = crate::context::ContextRegistry::new();
        let ctx = contexts.create(dir.path());

        let err = LibraryDiscovery::new().discover(Some(&ctx)).unwrap_err();
        assert!(matches!(err, ContextError::Io { .. }));
    }
}

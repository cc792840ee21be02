//! Artifact scanning: enumerate providers, isolate failures, dedup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexSet;
use tokio_util::sync::CancellationToken;

use berth_core::{HostConfig, LifecycleState, PluginDescriptor, PluginInstance, ScanError};

use crate::context::ContextRegistry;
use crate::discovery::ProviderDiscovery;

/// A candidate location for one external artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    /// Directory holding the artifact and its manifest.
    pub path: PathBuf,
}

impl ArtifactLocation {
    /// Wrap a path as an artifact location.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// List artifact locations under a plugin directory: every immediate
/// subdirectory carrying a `plugin.toml`, in name order.
pub fn discover_locations(plugin_dir: &Path) -> Vec<ArtifactLocation> {
    let entries = match std::fs::read_dir(plugin_dir) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(
                dir = %plugin_dir.display(),
                %error,
                "cannot read plugin directory, treating it as empty"
            );
            return vec![];
        }
    };

    let mut locations: Vec<ArtifactLocation> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir() && path.join("plugin.toml").exists())
        .map(ArtifactLocation::new)
        .collect();
    locations.sort_by(|a, b| a.path.cmp(&b.path));
    locations
}

/// One scan invocation over the configured discovery mechanisms.
///
/// In-process providers are realized first, then each supplied location
/// in order, each through its own freshly allocated loading context.
/// Per-provider and per-artifact failures are logged and skipped; only a
/// cancelled scope aborts the scan.
pub struct Scanner {
    scope: CancellationToken,
    config: HostConfig,
    discoveries: Vec<Arc<dyn ProviderDiscovery>>,
    contexts: Arc<ContextRegistry>,
}

impl Scanner {
    /// Create a scanner bound to the given scope and context registry.
    pub fn new(
        scope: CancellationToken,
        config: HostConfig,
        discoveries: Vec<Arc<dyn ProviderDiscovery>>,
        contexts: Arc<ContextRegistry>,
    ) -> Self {
        Self {
            scope,
            config,
            discoveries,
            contexts,
        }
    }

    /// Produce the deduplicated instance set for the given locations.
    pub fn scan(
        &self,
        locations: &[ArtifactLocation],
    ) -> Result<Vec<Arc<PluginInstance>>, ScanError> {
        self.ensure_active()?;

        let mut collected: Vec<Arc<PluginInstance>> = Vec::new();

        // In-process providers come first.
        for discovery in &self.discoveries {
            match discovery.discover(None) {
                Ok(instances) => collected.extend(instances),
                Err(error) => {
                    tracing::error!(
                        discovery = discovery.name(),
                        %error,
                        "in-process discovery failed, skipping"
                    );
                }
            }
        }

        // Then each artifact, in supplied order, through its own context.
        for location in locations {
            self.ensure_active()?;

            let context = self.contexts.create(&location.path);
            for discovery in self.discoveries.iter().filter(|d| d.handles_artifacts()) {
                match discovery.discover(Some(&context)) {
                    Ok(instances) => collected.extend(instances),
                    Err(error) => {
                        tracing::error!(
                            discovery = discovery.name(),
                            artifact = %location.path.display(),
                            %error,
                            "cannot load plugin artifact, skipping"
                        );
                    }
                }
            }
        }

        Ok(self.dedup(collected))
    }

    /// Collapse instances sharing descriptor and state, first seen wins,
    /// and drop instances disabled by configuration.
    fn dedup(&self, instances: Vec<Arc<PluginInstance>>) -> Vec<Arc<PluginInstance>> {
        let mut seen: IndexSet<(PluginDescriptor, LifecycleState)> = IndexSet::new();
        let mut result = Vec::with_capacity(instances.len());

        for instance in instances {
            let descriptor = instance.descriptor().clone();
            if self.config.is_disabled(&descriptor.name) {
                tracing::info!(plugin = %descriptor.name, "plugin disabled by configuration");
                continue;
            }
            if seen.insert((descriptor, instance.state())) {
                result.push(instance);
            }
        }
        result
    }

    fn ensure_active(&self) -> Result<(), ScanError> {
        if self.scope.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        Ok(())
    }
}

//! The host supervisor: root scope, configuration handles, and bulk
//! lifecycle sweeps over the retained instance set.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use berth_core::{
    BootstrapError, HostConfig, HostImplementation, LoginSolver, PluginInstance, ScanError,
    StorageSet,
};

use crate::context::ContextRegistry;
use crate::discovery::ProviderDiscovery;
use crate::lifecycle::LifecycleController;
use crate::scanner::{Scanner, discover_locations};

/// Everything the embedding front-end hands to the host: its contract
/// implementation, the configuration, and the discovery mechanisms.
pub struct HostSpec {
    /// The front-end's host contract implementation.
    pub implementation: Arc<dyn HostImplementation>,

    /// Process-wide configuration.
    pub config: HostConfig,

    /// Provider discovery mechanisms, in-process and artifact-capable.
    pub discoveries: Vec<Arc<dyn ProviderDiscovery>>,
}

/// A logger bound to a stable identity, handed to plugins and
/// subsystems. Events carry the identity as a structured field.
#[derive(Debug, Clone)]
pub struct HostLogger {
    identity: String,
}

impl HostLogger {
    /// The identity this logger reports under.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn info(&self, message: &str) {
        tracing::info!(plugin = %self.identity, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(plugin = %self.identity, "{message}");
    }

    pub fn error(&self, message: &str) {
        tracing::error!(plugin = %self.identity, "{message}");
    }
}

/// The process-wide host instance.
///
/// Owns the root cancellation scope; the plugin subsystem runs under a
/// child scope that is cancelled only when the host shuts down.
/// Subsystems receive this object by handle, never through a global.
pub struct Host {
    implementation: Arc<dyn HostImplementation>,
    config: HostConfig,
    storage: StorageSet,
    root: CancellationToken,
    plugin_scope: CancellationToken,
    contexts: Arc<ContextRegistry>,
    discoveries: Vec<Arc<dyn ProviderDiscovery>>,
    plugins: Mutex<Vec<Arc<PluginInstance>>>,
}

impl Host {
    /// Validate a spec and construct a host from it.
    ///
    /// Fails with [`BootstrapError::MalformedHost`] when the spec is
    /// structurally unusable: no discovery mechanism at all, or none
    /// capable of interpreting external artifacts.
    pub fn create(spec: HostSpec) -> Result<Arc<Self>, BootstrapError> {
        if spec.discoveries.is_empty() {
            return Err(BootstrapError::MalformedHost {
                reason: "no provider discovery mechanisms registered".to_string(),
            });
        }
        if !spec.discoveries.iter().any(|d| d.handles_artifacts()) {
            return Err(BootstrapError::MalformedHost {
                reason: "no artifact-capable discovery registered".to_string(),
            });
        }

        let root = CancellationToken::new();
        let plugin_scope = root.child_token();
        let storage = spec.implementation.storage();

        Ok(Arc::new(Self {
            implementation: spec.implementation,
            config: spec.config,
            storage,
            root,
            plugin_scope,
            contexts: Arc::new(ContextRegistry::new()),
            discoveries: spec.discoveries,
            plugins: Mutex::new(Vec::new()),
        }))
    }

    /// Scan the configured plugin directory and load every discovered
    /// instance.
    ///
    /// A per-plugin load failure is logged and skipped; the instance
    /// stays retained in its failed state for inspection. Only a
    /// cancelled scope aborts the start sequence.
    pub fn start(&self) -> Result<(), ScanError> {
        let locations = discover_locations(&self.config.plugin_dir);
        tracing::info!(
            plugin_dir = %self.config.plugin_dir.display(),
            artifacts = locations.len(),
            "starting plugin host"
        );

        let instances = self.scanner().scan(&locations)?;
        let controller = self.controller();
        for instance in &instances {
            let logger = self.new_logger(instance.descriptor().name.as_str());
            match controller.load(instance) {
                Ok(()) => logger.info("loaded"),
                Err(error) => {
                    tracing::error!(plugin = %instance.descriptor().name, %error, "load failed");
                }
            }
        }

        let mut plugins = self.plugins.lock().expect("plugin set lock poisoned");
        *plugins = instances;
        Ok(())
    }

    /// Create a logger reporting under the given identity.
    pub fn new_logger(&self, identity: impl Into<String>) -> HostLogger {
        HostLogger {
            identity: identity.into(),
        }
    }

    /// The host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// The front-end's storage handles.
    pub fn storage(&self) -> &StorageSet {
        &self.storage
    }

    /// Create a login solver through the front-end's factory.
    pub fn create_login_solver(&self, requester: u64) -> Arc<dyn LoginSolver> {
        self.implementation.create_login_solver(requester)
    }

    /// The loading-context registry.
    pub fn contexts(&self) -> &Arc<ContextRegistry> {
        &self.contexts
    }

    /// A handle to the plugin subsystem's cancellation scope.
    pub fn plugin_scope(&self) -> CancellationToken {
        self.plugin_scope.clone()
    }

    /// Build a scanner for this host's discoveries and context registry.
    pub fn scanner(&self) -> Scanner {
        Scanner::new(
            self.plugin_scope.clone(),
            self.config.clone(),
            self.discoveries.clone(),
            self.contexts.clone(),
        )
    }

    /// Build a lifecycle controller bound to the plugin scope.
    pub fn controller(&self) -> LifecycleController {
        LifecycleController::new(self.plugin_scope.clone())
    }

    /// Snapshot of the retained plugin instances.
    pub fn plugins(&self) -> Vec<Arc<PluginInstance>> {
        self.plugins.lock().expect("plugin set lock poisoned").clone()
    }

    /// Enable every retained instance. Per-plugin hook failures are
    /// logged and do not stop the sweep. Returns the number of
    /// instances now enabled.
    pub fn enable_all(&self) -> usize {
        Self::sweep(&self.controller(), &self.plugins(), "enable", |c, i| {
            c.enable(i)
        })
    }

    /// Disable every retained instance, symmetric to
    /// [`Self::enable_all`]. Returns the number of successful calls.
    pub fn disable_all(&self) -> usize {
        Self::sweep(&self.controller(), &self.plugins(), "disable", |c, i| {
            c.disable(i)
        })
    }

    fn sweep(
        controller: &LifecycleController,
        plugins: &[Arc<PluginInstance>],
        what: &str,
        op: impl Fn(&LifecycleController, &PluginInstance) -> Result<(), berth_core::LifecycleError>,
    ) -> usize {
        let mut succeeded = 0;
        for instance in plugins {
            match op(controller, instance) {
                Ok(()) => succeeded += 1,
                Err(error) => {
                    tracing::error!(
                        plugin = %instance.descriptor().name,
                        %error,
                        "{what} failed"
                    );
                }
            }
        }
        succeeded
    }

    /// Whether the host is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancel the root scope; every child scope, the plugin subsystem
    /// included, observes the cancellation transitively.
    pub fn shutdown(&self) {
        tracing::info!("plugin host shutting down");
        self.root.cancel();
    }

    /// Disable every retained instance, then tear the host down.
    ///
    /// The disable sweep runs on a blocking thread and is bounded by the
    /// configured shutdown grace; hooks still running when it elapses
    /// are abandoned. The root scope is cancelled either way. Returns
    /// the number of instances disabled within the grace period.
    pub async fn shutdown_graceful(&self) -> usize {
        let controller = self.controller();
        let plugins = self.plugins();
        let sweep = tokio::task::spawn_blocking(move || {
            Self::sweep(&controller, &plugins, "disable", |c, i| c.disable(i))
        });
        let disabled = match tokio::time::timeout(self.config.shutdown_grace, sweep).await {
            Ok(Ok(count)) => count,
            Ok(Err(error)) => {
                tracing::error!(%error, "disable sweep panicked");
                0
            }
            Err(_) => {
                tracing::warn!(
                    grace = ?self.config.shutdown_grace,
                    "shutdown grace elapsed before every plugin disabled"
                );
                0
            }
        };
        self.shutdown();
        disabled
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("contexts", &self.contexts.len())
            .field("plugins", &self.plugins().len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

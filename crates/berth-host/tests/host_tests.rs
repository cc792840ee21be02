//! Behavioral tests for the scanner, lifecycle controller, and host
//! supervisor, using in-memory plugins and discoveries.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use berth_core::{
    ContextError, DataStorage, GuardedPlugin, HookError, HostConfig, HostImplementation,
    LifecycleError, LifecycleState, LoginSolver, Plugin, PluginDescriptor, PluginInstance,
    ScanError, StorageSet,
};
use berth_host::{
    ArtifactLocation, ContextRegistry, Host, HostSpec, LifecycleController, LoadingContext,
    ProviderDiscovery, Scanner, StaticRegistry,
};

/// A plugin that counts hook invocations and can be told to fail.
struct TestPlugin {
    descriptor: PluginDescriptor,
    loads: AtomicUsize,
    enables: AtomicUsize,
    disables: AtomicUsize,
    fail_load: bool,
    fail_enable: bool,
    fail_disable: bool,
}

impl TestPlugin {
    fn named(name: &str) -> Arc<Self> {
        Arc::new(Self {
            descriptor: PluginDescriptor::in_process(name, "1.0.0"),
            loads: AtomicUsize::new(0),
            enables: AtomicUsize::new(0),
            disables: AtomicUsize::new(0),
            fail_load: false,
            fail_enable: false,
            fail_disable: false,
        })
    }

    fn failing_load(name: &str) -> Arc<Self> {
        let mut plugin = Self::named(name);
        Arc::get_mut(&mut plugin).unwrap().fail_load = true;
        plugin
    }

    fn failing_enable(name: &str) -> Arc<Self> {
        let mut plugin = Self::named(name);
        Arc::get_mut(&mut plugin).unwrap().fail_enable = true;
        plugin
    }

    fn failing_disable(name: &str) -> Arc<Self> {
        let mut plugin = Self::named(name);
        Arc::get_mut(&mut plugin).unwrap().fail_disable = true;
        plugin
    }
}

impl Plugin for TestPlugin {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn on_load(&self) -> Result<(), HookError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err("load hook exploded".into());
        }
        Ok(())
    }

    fn on_enable(&self) -> Result<(), HookError> {
        self.enables.fetch_add(1, Ordering::SeqCst);
        if self.fail_enable {
            return Err("enable hook exploded".into());
        }
        Ok(())
    }

    fn on_disable(&self) -> Result<(), HookError> {
        self.disables.fetch_add(1, Ordering::SeqCst);
        if self.fail_disable {
            return Err("disable hook exploded".into());
        }
        Ok(())
    }
}

fn controller() -> LifecycleController {
    LifecycleController::new(CancellationToken::new())
}

// ---------------------------------------------------------------------
// Lifecycle controller
// ---------------------------------------------------------------------

#[test]
fn test_enable_is_idempotent() {
    let plugin = TestPlugin::named("p");
    let instance = PluginInstance::public(plugin.clone());
    let controller = controller();

    controller.load(&instance).unwrap();
    controller.enable(&instance).unwrap();
    controller.enable(&instance).unwrap();
    controller.enable(&instance).unwrap();

    assert_eq!(plugin.enables.load(Ordering::SeqCst), 1);
    assert_eq!(instance.state(), LifecycleState::Enabled);
}

#[test]
fn test_disable_is_idempotent() {
    let plugin = TestPlugin::named("p");
    let instance = PluginInstance::public(plugin.clone());
    let controller = controller();

    // Disabling before enable is a no-op, not an error.
    controller.load(&instance).unwrap();
    controller.disable(&instance).unwrap();
    assert_eq!(plugin.disables.load(Ordering::SeqCst), 0);

    controller.enable(&instance).unwrap();
    controller.disable(&instance).unwrap();
    controller.disable(&instance).unwrap();

    assert_eq!(plugin.disables.load(Ordering::SeqCst), 1);
    assert_eq!(instance.state(), LifecycleState::Disabled);
}

// The idempotency check and the transition happen under one lock, so
// racing callers cannot both observe a pre-transition state.
#[test]
fn test_concurrent_enable_runs_the_hook_once() {
    let plugin = TestPlugin::named("p");
    let instance = Arc::new(PluginInstance::public(plugin.clone()));
    let controller = Arc::new(controller());
    controller.load(&instance).unwrap();

    let barrier = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let controller = controller.clone();
            let instance = instance.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                controller.enable(&instance).is_ok()
            })
        })
        .collect();

    // Every caller succeeds: one ran the hook, the rest saw Enabled.
    assert!(handles.into_iter().all(|h| h.join().unwrap()));
    assert_eq!(plugin.enables.load(Ordering::SeqCst), 1);
    assert_eq!(instance.state(), LifecycleState::Enabled);
}

#[test]
fn test_second_load_is_rejected() {
    let plugin = TestPlugin::named("p");
    let instance = PluginInstance::public(plugin.clone());
    let controller = controller();

    controller.load(&instance).unwrap();
    let err = controller.load(&instance).unwrap_err();

    assert!(matches!(err, LifecycleError::AlreadyLoaded { .. }));
    assert_eq!(plugin.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_load_failure_is_wrapped_and_parks_failed() {
    let plugin = TestPlugin::failing_load("fragile");
    let instance = PluginInstance::public(plugin.clone());

    let err = controller().load(&instance).unwrap_err();

    match &err {
        LifecycleError::Load { name, .. } => assert_eq!(name, "fragile"),
        other => panic!("expected Load error, got {other:?}"),
    }
    assert!(err.to_string().contains("fragile"));
    assert_eq!(instance.state(), LifecycleState::Failed);
}

#[test]
fn test_enable_on_unloaded_is_rejected_without_autoload() {
    let plugin = TestPlugin::named("p");
    let instance = PluginInstance::public(plugin.clone());

    let err = controller().enable(&instance).unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::NotLoaded {
            state: LifecycleState::Unloaded,
            ..
        }
    ));
    // Neither the load nor the enable hook ran.
    assert_eq!(plugin.loads.load(Ordering::SeqCst), 0);
    assert_eq!(plugin.enables.load(Ordering::SeqCst), 0);
}

// Pins the wrapping asymmetry: load failures carry the plugin name,
// enable failures surface the raw hook error without it.
#[test]
fn test_enable_failure_propagates_unwrapped() {
    let plugin = TestPlugin::failing_enable("fragile");
    let instance = PluginInstance::public(plugin.clone());
    let controller = controller();

    controller.load(&instance).unwrap();
    let err = controller.enable(&instance).unwrap_err();

    assert!(matches!(err, LifecycleError::Hook(_)));
    assert_eq!(err.to_string(), "enable hook exploded");
    assert!(!err.to_string().contains("fragile"));
    assert_eq!(instance.state(), LifecycleState::Failed);
}

#[test]
fn test_disable_failure_leaves_instance_enabled() {
    let plugin = TestPlugin::failing_disable("p");
    let instance = PluginInstance::public(plugin.clone());
    let controller = controller();

    controller.load(&instance).unwrap();
    controller.enable(&instance).unwrap();
    let err = controller.disable(&instance).unwrap_err();

    assert_eq!(err.to_string(), "disable hook exploded");
    assert_eq!(instance.state(), LifecycleState::Enabled);
}

#[test]
fn test_enable_after_failure_is_rejected() {
    let plugin = TestPlugin::failing_load("p");
    let instance = PluginInstance::public(plugin.clone());
    let controller = controller();

    let _ = controller.load(&instance);
    let err = controller.enable(&instance).unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::NotLoaded {
            state: LifecycleState::Failed,
            ..
        }
    ));
}

#[test]
fn test_guarded_hooks_take_precedence() {
    struct Instrumented {
        descriptor: PluginDescriptor,
        public_enables: AtomicUsize,
        guarded_enables: AtomicUsize,
    }

    impl Plugin for Instrumented {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }
        fn on_enable(&self) -> Result<(), HookError> {
            self.public_enables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl GuardedPlugin for Instrumented {
        fn guarded_on_enable(&self) -> Result<(), HookError> {
            self.guarded_enables.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    let plugin = Arc::new(Instrumented {
        descriptor: PluginDescriptor::in_process("instrumented", "1.0.0"),
        public_enables: AtomicUsize::new(0),
        guarded_enables: AtomicUsize::new(0),
    });
    let instance = PluginInstance::guarded(plugin.clone());
    let controller = controller();

    controller.load(&instance).unwrap();
    controller.enable(&instance).unwrap();

    assert_eq!(plugin.guarded_enables.load(Ordering::SeqCst), 1);
    assert_eq!(plugin.public_enables.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------

/// Artifact-capable discovery serving a fixed instance list per call.
struct FixedArtifacts {
    factories: Vec<Box<dyn Fn() -> PluginInstance + Send + Sync>>,
}

impl FixedArtifacts {
    fn new(factories: Vec<Box<dyn Fn() -> PluginInstance + Send + Sync>>) -> Self {
        Self { factories }
    }
}

impl ProviderDiscovery for FixedArtifacts {
    fn name(&self) -> &'static str {
        "fixed-artifacts"
    }

    fn handles_artifacts(&self) -> bool {
        true
    }

    fn discover(
        &self,
        context: Option<&LoadingContext>,
    ) -> Result<Vec<Arc<PluginInstance>>, ContextError> {
        if context.is_none() {
            return Ok(vec![]);
        }
        Ok(self.factories.iter().map(|f| Arc::new(f())).collect())
    }
}

/// Artifact-capable discovery that always fails.
struct BrokenArtifacts;

impl ProviderDiscovery for BrokenArtifacts {
    fn name(&self) -> &'static str {
        "broken-artifacts"
    }

    fn handles_artifacts(&self) -> bool {
        true
    }

    fn discover(
        &self,
        context: Option<&LoadingContext>,
    ) -> Result<Vec<Arc<PluginInstance>>, ContextError> {
        if context.is_none() {
            return Ok(vec![]);
        }
        Err(ContextError::Provider {
            provider: "broken".to_string(),
            message: "artifact rejected".to_string(),
        })
    }
}

fn scanner_with(
    discoveries: Vec<Arc<dyn ProviderDiscovery>>,
    config: HostConfig,
    scope: CancellationToken,
) -> (Scanner, Arc<ContextRegistry>) {
    let contexts = Arc::new(ContextRegistry::new());
    (
        Scanner::new(scope, config, discoveries, contexts.clone()),
        contexts,
    )
}

fn in_process(name: &str) -> PluginInstance {
    PluginInstance::public(TestPlugin::named(name))
}

#[test]
fn test_scan_dedups_across_sources_keeping_first_seen_order() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("p1")));

    // The artifact provides a p1-equivalent (identical descriptor) and p2.
    let artifacts = FixedArtifacts::new(vec![
        Box::new(|| in_process("p1")),
        Box::new(|| in_process("p2")),
    ]);

    let (scanner, _contexts) = scanner_with(
        vec![Arc::new(registry), Arc::new(artifacts)],
        HostConfig::rooted_at("/tmp/berth-scan-test"),
        CancellationToken::new(),
    );

    let result = scanner
        .scan(&[ArtifactLocation::new("/tmp/berth-scan-test/plugins/a")])
        .unwrap();

    let names: Vec<&str> = result
        .iter()
        .map(|i| i.descriptor().name.as_str())
        .collect();
    assert_eq!(names, vec!["p1", "p2"]);
}

#[test]
fn test_scan_isolates_failing_providers() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("healthy")));
    registry.register(|| Err("bad provider".into()));

    let (scanner, _contexts) = scanner_with(
        vec![Arc::new(registry), Arc::new(BrokenArtifacts)],
        HostConfig::rooted_at("/tmp/berth-scan-test"),
        CancellationToken::new(),
    );

    // The broken artifact discovery fails per location but must not
    // abort the scan either.
    let result = scanner
        .scan(&[ArtifactLocation::new("/tmp/berth-scan-test/plugins/a")])
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].descriptor().name, "healthy");
}

#[test]
fn test_scan_in_process_precedes_artifacts() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("local")));

    let artifacts = FixedArtifacts::new(vec![Box::new(|| in_process("external"))]);

    let (scanner, _contexts) = scanner_with(
        vec![Arc::new(artifacts), Arc::new(registry)],
        HostConfig::rooted_at("/tmp/berth-scan-test"),
        CancellationToken::new(),
    );

    let result = scanner
        .scan(&[ArtifactLocation::new("/tmp/berth-scan-test/plugins/x")])
        .unwrap();

    let names: Vec<&str> = result
        .iter()
        .map(|i| i.descriptor().name.as_str())
        .collect();
    // In-process providers are realized before any artifact, regardless
    // of discovery registration order.
    assert_eq!(names, vec!["local", "external"]);
}

#[test]
fn test_scan_allocates_one_context_per_location() {
    let artifacts = FixedArtifacts::new(vec![Box::new(|| in_process("a"))]);
    let (scanner, contexts) = scanner_with(
        vec![Arc::new(artifacts)],
        HostConfig::rooted_at("/tmp/berth-scan-test"),
        CancellationToken::new(),
    );

    scanner
        .scan(&[
            ArtifactLocation::new("/plugins/one"),
            ArtifactLocation::new("/plugins/two"),
        ])
        .unwrap();

    assert_eq!(contexts.len(), 2);
    let artifacts: Vec<_> = contexts
        .contexts()
        .iter()
        .map(|c| c.artifact().to_path_buf())
        .collect();
    assert_eq!(
        artifacts,
        vec![Path::new("/plugins/one"), Path::new("/plugins/two")]
    );
}

#[test]
fn test_scan_fails_fast_when_cancelled() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("p")));

    let scope = CancellationToken::new();
    let (scanner, _contexts) = scanner_with(
        vec![Arc::new(registry)],
        HostConfig::rooted_at("/tmp/berth-scan-test"),
        scope.clone(),
    );

    scope.cancel();
    assert!(matches!(scanner.scan(&[]), Err(ScanError::Cancelled)));
}

#[test]
fn test_scan_skips_plugins_disabled_by_config() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("wanted")));
    registry.register(|| Ok(in_process("unwanted")));

    let config = HostConfig::rooted_at("/tmp/berth-scan-test").disable_plugin("unwanted");
    let (scanner, _contexts) =
        scanner_with(vec![Arc::new(registry)], config, CancellationToken::new());

    let result = scanner.scan(&[]).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].descriptor().name, "wanted");
}

// ---------------------------------------------------------------------
// Host supervisor
// ---------------------------------------------------------------------

struct NullStorage;

impl DataStorage for NullStorage {
    fn load(&self, _plugin: &str, _key: &str) -> std::io::Result<Option<String>> {
        Ok(None)
    }
    fn store(&self, _plugin: &str, _key: &str, _value: &str) -> std::io::Result<()> {
        Ok(())
    }
}

struct NullSolver;

impl LoginSolver for NullSolver {
    fn solve(&self, _requester: u64, challenge: &str) -> Result<String, HookError> {
        Ok(challenge.to_string())
    }
}

struct TestFrontEnd;

impl HostImplementation for TestFrontEnd {
    fn root_path(&self) -> &Path {
        Path::new(".")
    }
    fn storage(&self) -> StorageSet {
        StorageSet::uniform(Arc::new(NullStorage))
    }
    fn create_login_solver(&self, _requester: u64) -> Arc<dyn LoginSolver> {
        Arc::new(NullSolver)
    }
}

fn host_with_config(registry: StaticRegistry, config: HostConfig) -> Arc<Host> {
    let discoveries: Vec<Arc<dyn ProviderDiscovery>> = vec![
        Arc::new(registry),
        Arc::new(FixedArtifacts::new(vec![])),
    ];
    Host::create(HostSpec {
        implementation: Arc::new(TestFrontEnd),
        config,
        discoveries,
    })
    .unwrap()
}

fn host_with_registry(registry: StaticRegistry) -> Arc<Host> {
    host_with_config(
        registry,
        HostConfig::rooted_at("/nonexistent/berth-host-test"),
    )
}

#[test]
fn test_host_start_loads_retained_instances() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("p1")));
    registry.register(|| Ok(in_process("p2")));

    let host = host_with_registry(registry);
    host.start().unwrap();

    let plugins = host.plugins();
    assert_eq!(plugins.len(), 2);
    assert!(
        plugins
            .iter()
            .all(|p| p.state() == LifecycleState::Loaded)
    );

    assert_eq!(host.enable_all(), 2);
    assert!(
        host.plugins()
            .iter()
            .all(|p| p.state() == LifecycleState::Enabled)
    );

    assert_eq!(host.disable_all(), 2);
    assert!(
        host.plugins()
            .iter()
            .all(|p| p.state() == LifecycleState::Disabled)
    );
}

#[test]
fn test_host_retains_failed_loads_and_skips_them_on_enable() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("good")));
    registry.register(|| Ok(PluginInstance::public(TestPlugin::failing_load("bad"))));

    let host = host_with_registry(registry);
    host.start().unwrap();

    let plugins = host.plugins();
    assert_eq!(plugins.len(), 2);
    let failed: Vec<&str> = plugins
        .iter()
        .filter(|p| p.state() == LifecycleState::Failed)
        .map(|p| p.descriptor().name.as_str())
        .collect();
    assert_eq!(failed, vec!["bad"]);

    // The sweep logs the failed plugin and carries on.
    assert_eq!(host.enable_all(), 1);
}

#[tokio::test]
async fn test_graceful_shutdown_disables_within_grace() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("p")));

    let host = host_with_registry(registry);
    host.start().unwrap();
    assert_eq!(host.enable_all(), 1);

    assert_eq!(host.shutdown_graceful().await, 1);
    assert!(host.is_shutting_down());
    assert!(
        host.plugins()
            .iter()
            .all(|p| p.state() == LifecycleState::Disabled)
    );
}

#[tokio::test]
async fn test_graceful_shutdown_abandons_slow_disable_hooks() {
    struct SlowDisable {
        descriptor: PluginDescriptor,
    }

    impl Plugin for SlowDisable {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }
        fn on_disable(&self) -> Result<(), HookError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        }
    }

    let registry = StaticRegistry::new();
    registry.register(|| {
        Ok(PluginInstance::public(Arc::new(SlowDisable {
            descriptor: PluginDescriptor::in_process("sluggish", "1.0.0"),
        })))
    });

    let config = HostConfig::rooted_at("/nonexistent/berth-host-test")
        .with_shutdown_grace(Duration::from_millis(20));
    let host = host_with_config(registry, config);
    host.start().unwrap();
    assert_eq!(host.enable_all(), 1);

    // The sweep outlives the grace; the host tears down anyway.
    assert_eq!(host.shutdown_graceful().await, 0);
    assert!(host.is_shutting_down());
    assert!(host.plugin_scope().is_cancelled());
}

#[test]
fn test_shutdown_cancels_the_plugin_scope() {
    let registry = StaticRegistry::new();
    registry.register(|| Ok(in_process("p")));

    let host = host_with_registry(registry);
    host.start().unwrap();
    host.shutdown();

    assert!(host.is_shutting_down());
    assert!(host.plugin_scope().is_cancelled());
    assert!(matches!(
        host.scanner().scan(&[]),
        Err(ScanError::Cancelled)
    ));
    let instance = in_process("late");
    assert!(matches!(
        host.controller().load(&instance),
        Err(LifecycleError::Cancelled)
    ));
}

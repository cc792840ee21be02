//! Lifecycle transitions: load, enable, disable.
//!
//! Every operation checks scope liveness first, performs an idempotency
//! check under the instance's state lock, and only then dispatches the
//! hook (guarded variant preferred). A load failure is wrapped with the
//! plugin's identity; enable and disable failures surface unwrapped.

use tokio_util::sync::CancellationToken;

use berth_core::{LifecycleError, LifecycleState, PluginInstance};

/// Drives plugin instances through their lifecycle transitions.
///
/// Hooks run while the instance's state lock is held, which keeps the
/// idempotency check and the transition atomic under concurrent calls.
/// The flip side: a hook must not call back into a controller for its
/// own instance, that deadlocks on the state lock.
pub struct LifecycleController {
    scope: CancellationToken,
}

impl LifecycleController {
    /// Create a controller bound to the given scope.
    pub fn new(scope: CancellationToken) -> Self {
        Self { scope }
    }

    /// Load an instance. Must be called exactly once, before the first
    /// enable; a second call is rejected with
    /// [`LifecycleError::AlreadyLoaded`].
    ///
    /// A hook failure parks the instance in [`LifecycleState::Failed`]
    /// and is reported as [`LifecycleError::Load`] naming the plugin.
    pub fn load(&self, instance: &PluginInstance) -> Result<(), LifecycleError> {
        self.ensure_active()?;

        instance.with_state(|state| {
            if *state != LifecycleState::Unloaded {
                return Err(LifecycleError::AlreadyLoaded {
                    name: instance.descriptor().name.clone(),
                });
            }

            match instance.hooks().dispatch_load() {
                Ok(()) => {
                    *state = LifecycleState::Loaded;
                    tracing::debug!(plugin = %instance.descriptor().name, "plugin loaded");
                    Ok(())
                }
                Err(source) => {
                    *state = LifecycleState::Failed;
                    Err(LifecycleError::Load {
                        name: instance.descriptor().name.clone(),
                        source,
                    })
                }
            }
        })
    }

    /// Enable an instance. A no-op if already enabled; rejected with
    /// [`LifecycleError::NotLoaded`] if the instance was never loaded.
    ///
    /// A hook failure parks the instance in [`LifecycleState::Failed`]
    /// and propagates unwrapped.
    pub fn enable(&self, instance: &PluginInstance) -> Result<(), LifecycleError> {
        self.ensure_active()?;

        instance.with_state(|state| {
            if state.is_enabled() {
                return Ok(());
            }
            if !state.can_enable() {
                return Err(LifecycleError::NotLoaded {
                    name: instance.descriptor().name.clone(),
                    state: *state,
                });
            }

            match instance.hooks().dispatch_enable() {
                Ok(()) => {
                    *state = LifecycleState::Enabled;
                    tracing::debug!(plugin = %instance.descriptor().name, "plugin enabled");
                    Ok(())
                }
                Err(source) => {
                    *state = LifecycleState::Failed;
                    Err(LifecycleError::Hook(source))
                }
            }
        })
    }

    /// Disable an instance. A no-op unless currently enabled.
    ///
    /// A hook failure leaves the instance enabled and propagates
    /// unwrapped, symmetric to [`Self::enable`].
    pub fn disable(&self, instance: &PluginInstance) -> Result<(), LifecycleError> {
        self.ensure_active()?;

        instance.with_state(|state| {
            if !state.can_disable() {
                return Ok(());
            }

            match instance.hooks().dispatch_disable() {
                Ok(()) => {
                    *state = LifecycleState::Disabled;
                    tracing::debug!(plugin = %instance.descriptor().name, "plugin disabled");
                    Ok(())
                }
                Err(source) => Err(LifecycleError::Hook(source)),
            }
        })
    }

    fn ensure_active(&self) -> Result<(), LifecycleError> {
        if self.scope.is_cancelled() {
            return Err(LifecycleError::Cancelled);
        }
        Ok(())
    }
}

//! Plugin capability traits and the runtime instance wrapper.
//!
//! Plugins implement [`Plugin`] (the public hook surface) or additionally
//! [`GuardedPlugin`] (instrumented hook variants the lifecycle controller
//! prefers when present). The two variants are carried as a tagged union
//! in [`PluginHooks`], so dispatch selection is a plain match rather than
//! anything reflective.

use std::sync::{Arc, Mutex};

use crate::descriptor::PluginDescriptor;
use crate::state::LifecycleState;

/// Error carrier returned by plugin hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// The public plugin capability contract.
pub trait Plugin: Send + Sync {
    /// Identity of this plugin.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Invoked exactly once, before the first enable.
    fn on_load(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Invoked on every transition into the enabled state.
    fn on_enable(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Invoked on every transition out of the enabled state.
    fn on_disable(&self) -> Result<(), HookError> {
        Ok(())
    }
}

/// Guarded hook variants, preferred over the public ones when a plugin
/// exposes them.
///
/// Implementations typically wrap the public hooks with instrumentation
/// (timing, structured logging, panic containment).
pub trait GuardedPlugin: Plugin {
    fn guarded_on_load(&self) -> Result<(), HookError> {
        self.on_load()
    }

    fn guarded_on_enable(&self) -> Result<(), HookError> {
        self.on_enable()
    }

    fn guarded_on_disable(&self) -> Result<(), HookError> {
        self.on_disable()
    }
}

/// Tagged union over the two capability variants.
#[derive(Clone)]
pub enum PluginHooks {
    /// Only the public hook surface is available.
    Public(Arc<dyn Plugin>),

    /// Guarded hook variants are available and take precedence.
    Guarded(Arc<dyn GuardedPlugin>),
}

impl PluginHooks {
    /// Identity of the underlying plugin.
    pub fn descriptor(&self) -> &PluginDescriptor {
        match self {
            Self::Public(p) => p.descriptor(),
            Self::Guarded(p) => p.descriptor(),
        }
    }

    /// Dispatch the load hook, guarded variant first.
    pub fn dispatch_load(&self) -> Result<(), HookError> {
        match self {
            Self::Public(p) => p.on_load(),
            Self::Guarded(p) => p.guarded_on_load(),
        }
    }

    /// Dispatch the enable hook, guarded variant first.
    pub fn dispatch_enable(&self) -> Result<(), HookError> {
        match self {
            Self::Public(p) => p.on_enable(),
            Self::Guarded(p) => p.guarded_on_enable(),
        }
    }

    /// Dispatch the disable hook, guarded variant first.
    pub fn dispatch_disable(&self) -> Result<(), HookError> {
        match self {
            Self::Public(p) => p.on_disable(),
            Self::Guarded(p) => p.guarded_on_disable(),
        }
    }
}

impl std::fmt::Debug for PluginHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public(p) => write!(f, "Public({})", p.descriptor()),
            Self::Guarded(p) => write!(f, "Guarded({})", p.descriptor()),
        }
    }
}

/// A concrete plugin instance tracked by the host.
///
/// Wraps the plugin's hooks together with its mutable lifecycle state.
/// The state is lock-guarded so that the controller's check-then-dispatch
/// sequences cannot tear under concurrent invocation.
#[derive(Debug)]
pub struct PluginInstance {
    hooks: PluginHooks,
    state: Mutex<LifecycleState>,
}

impl PluginInstance {
    /// Wrap a set of hooks into a fresh, unloaded instance.
    pub fn new(hooks: PluginHooks) -> Self {
        Self {
            hooks,
            state: Mutex::new(LifecycleState::Unloaded),
        }
    }

    /// Convenience constructor for a public plugin.
    pub fn public(plugin: Arc<dyn Plugin>) -> Self {
        Self::new(PluginHooks::Public(plugin))
    }

    /// Convenience constructor for a guarded plugin.
    pub fn guarded(plugin: Arc<dyn GuardedPlugin>) -> Self {
        Self::new(PluginHooks::Guarded(plugin))
    }

    /// Identity of this instance.
    pub fn descriptor(&self) -> &PluginDescriptor {
        self.hooks.descriptor()
    }

    /// The hook set, for dispatch by the lifecycle controller.
    pub fn hooks(&self) -> &PluginHooks {
        &self.hooks
    }

    /// Snapshot of the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().expect("plugin state lock poisoned")
    }

    /// Run a read-modify-write on the lifecycle state under the lock.
    ///
    /// Intended for the lifecycle controller; the closure observes the
    /// current state and may replace it atomically with respect to other
    /// callers of this method.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut LifecycleState) -> R) -> R {
        let mut guard = self.state.lock().expect("plugin state lock poisoned");
        f(&mut guard)
    }
}

impl PartialEq for PluginInstance {
    /// Value identity: same descriptor in the same state.
    fn eq(&self, other: &Self) -> bool {
        self.descriptor() == other.descriptor() && self.state() == other.state()
    }
}

impl Eq for PluginInstance {}

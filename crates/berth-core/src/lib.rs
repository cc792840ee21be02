//! Core types and contracts for the berth plugin host.
//!
//! This crate provides the fundamental data structures shared by the host
//! engine and by plugins: descriptors, lifecycle state, the plugin
//! capability traits, the host contract consumed by the engine, and the
//! error taxonomy.

mod config;
mod contract;
mod descriptor;
mod error;
mod plugin;
mod state;

pub use config::HostConfig;
pub use contract::{
    DataStorage, HostImplementation, JsonFileStorage, LoginSolver, StorageSet,
};
pub use descriptor::{PluginDescriptor, SourceKind};
pub use error::{BootstrapError, ContextError, LifecycleError, ScanError};
pub use plugin::{GuardedPlugin, HookError, Plugin, PluginHooks, PluginInstance};
pub use state::LifecycleState;

//! Discovery, isolation, and lifecycle engine for the berth plugin host.
//!
//! # Architecture
//!
//! The engine is built from five pieces, leaves first:
//!
//! - [`bootstrap`]: the single-writer gate installing the one
//!   process-wide [`Host`].
//! - [`Host`]: the supervisor owning the root cancellation scope and the
//!   front-end's configuration handles.
//! - [`Scanner`]: turns a set of artifact locations plus the in-process
//!   registrations into a deduplicated instance set, isolating
//!   per-artifact failures.
//! - [`ContextRegistry`]: one isolated [`LoadingContext`] per external
//!   artifact, tracked for the artifact's lifetime.
//! - [`LifecycleController`]: drives instances through
//!   load/enable/disable, idempotent and exception-contained.
//!
//! # Example
//!
//! ```ignore
//! use berth_host::{bootstrap, HostSpec};
//!
//! let host = bootstrap(HostSpec {
//!     implementation: front_end,
//!     config,
//!     discoveries: vec![registry, library_discovery],
//! })?;
//! host.enable_all();
//! ```

mod bootstrap;
mod context;
mod discovery;
mod lifecycle;
mod scanner;
mod supervisor;

pub use bootstrap::{bootstrap, installed};
pub use context::{ContextId, ContextRegistry, LoadingContext};
pub use discovery::{
    ArtifactManifest, LibraryDiscovery, PLUGIN_ENTRY_SYMBOL, PluginEntry, ProviderDiscovery,
    StaticRegistry,
};
pub use lifecycle::LifecycleController;
pub use scanner::{ArtifactLocation, Scanner, discover_locations};
pub use supervisor::{Host, HostLogger, HostSpec};

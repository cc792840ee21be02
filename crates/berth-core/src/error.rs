//! Error taxonomy for the plugin host.

use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::HookError;
use crate::state::LifecycleState;

/// Errors raised by the bootstrap gate.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A host instance has already been installed in this process.
    #[error("a host instance is already installed")]
    AlreadyInstalled,

    /// The candidate host implementation is structurally invalid.
    #[error("malformed host implementation: {reason}")]
    MalformedHost { reason: String },
}

/// Errors raised while allocating a loading context or discovering
/// providers inside one.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The artifact manifest is missing or unparseable.
    #[error("invalid manifest at {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// I/O failure reading the artifact.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact library could not be loaded.
    #[error("failed to load library {path}: {message}")]
    Library { path: PathBuf, message: String },

    /// The declared entry symbol was not found in the library.
    #[error("missing entry symbol `{symbol}` in {path}")]
    EntrySymbol { path: PathBuf, symbol: String },

    /// A provider failed while realizing its instances.
    #[error("provider `{provider}` failed: {message}")]
    Provider { provider: String, message: String },
}

/// Errors raised by a scan invocation.
///
/// Per-artifact failures are logged and skipped and never surface here;
/// a scan only errors when the host itself is going away.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The owning scope was cancelled before or during the scan.
    #[error("scan aborted: host is shutting down")]
    Cancelled,
}

/// Errors raised by lifecycle transitions.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The load hook errored; wrapped with the plugin's identity.
    #[error("exception while loading plugin `{name}`")]
    Load {
        name: String,
        #[source]
        source: HookError,
    },

    /// Load was invoked a second time on the same instance.
    #[error("plugin `{name}` is already loaded")]
    AlreadyLoaded { name: String },

    /// Enable was invoked on an instance that is not loadable.
    #[error("plugin `{name}` cannot be enabled from state `{state}`")]
    NotLoaded { name: String, state: LifecycleState },

    /// An enable or disable hook errored.
    ///
    /// Deliberately carries no descriptor context: load failures are
    /// wrapped, enable/disable failures surface as-is.
    #[error("{0}")]
    Hook(#[source] HookError),

    /// The owning scope was cancelled before the transition ran.
    #[error("lifecycle operation aborted: host is shutting down")]
    Cancelled,
}

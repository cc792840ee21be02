//! Plugin lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a plugin instance.
///
/// Transitions are driven exclusively by the lifecycle controller:
/// `Unloaded -> Loaded -> Enabled <-> Disabled`, with `Failed` as the
/// terminal state for an instance whose load or enable hook errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Instantiated but not yet loaded.
    #[default]
    Unloaded,

    /// Load hook completed successfully.
    Loaded,

    /// Enable hook completed successfully.
    Enabled,

    /// Disabled after having been enabled.
    Disabled,

    /// A load or enable hook errored; the instance is parked.
    Failed,
}

impl LifecycleState {
    /// Whether the instance is currently enabled.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// Whether an enable transition is meaningful from this state.
    pub fn can_enable(&self) -> bool {
        matches!(self, Self::Loaded | Self::Disabled)
    }

    /// Whether a disable transition is meaningful from this state.
    pub fn can_disable(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Loaded => write!(f, "loaded"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

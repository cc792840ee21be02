//! Plugin identity.

use serde::{Deserialize, Serialize};

/// Where a plugin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Registered in-process, no backing file.
    InProcess,

    /// Discovered from an external artifact on disk.
    Artifact,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess => write!(f, "in-process"),
            Self::Artifact => write!(f, "artifact"),
        }
    }
}

/// Immutable identity of a logical plugin.
///
/// Two instances carrying equal descriptors are the same logical plugin;
/// the scanner collapses them to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin name.
    pub name: String,

    /// Plugin version string.
    pub version: String,

    /// Declared source kind.
    pub source: SourceKind,
}

impl PluginDescriptor {
    /// Create a descriptor for an in-process plugin.
    pub fn in_process(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: SourceKind::InProcess,
        }
    }

    /// Create a descriptor for a file-backed plugin.
    pub fn artifact(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            source: SourceKind::Artifact,
        }
    }
}

impl std::fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{} ({})", self.name, self.version, self.source)
    }
}

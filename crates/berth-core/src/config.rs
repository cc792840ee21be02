//! Host configuration.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Process-wide host configuration.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Root directory the host runs in.
    pub root_dir: PathBuf,

    /// Directory scanned for external plugin artifacts.
    pub plugin_dir: PathBuf,

    /// Names of plugins that must not be loaded.
    pub disabled_plugins: HashSet<String>,

    /// How long graceful shutdown waits for the disable sweep to
    /// finish before abandoning it.
    pub shutdown_grace: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        let root_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("berth");

        Self {
            plugin_dir: root_dir.join("plugins"),
            root_dir,
            disabled_plugins: HashSet::new(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl HostConfig {
    /// Create a config rooted at the given directory, with the plugin
    /// directory defaulting to `<root>/plugins`.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root_dir = root.into();
        Self {
            plugin_dir: root_dir.join("plugins"),
            root_dir,
            ..Self::default()
        }
    }

    /// Override the plugin artifact directory.
    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    /// Mark a plugin as disabled by name.
    pub fn disable_plugin(mut self, name: impl Into<String>) -> Self {
        self.disabled_plugins.insert(name.into());
        self
    }

    /// Override the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Check if a plugin is disabled by configuration.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_plugins.contains(name)
    }
}

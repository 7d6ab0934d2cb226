use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::channel::ChannelPlugin;
use crate::types::{PluginHost, PluginSummary};

/// Registry of enabled channel plugins, keyed by [`ChannelPlugin::name`].
/// The gateway builds one of these at startup, registers every enabled
/// plugin, then calls [`initialize_all`](PluginRegistry::initialize_all)
/// once before serving traffic.
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn ChannelPlugin>>,
}

impl PluginRegistry {
    /// Create an empty registry with no registered plugins.
    pub fn new() -> Self {
        Self { plugins: HashMap::new() }
    }

    /// Register a plugin. A second registration under the same name
    /// replaces the first.
    pub fn register(&mut self, plugin: Arc<dyn ChannelPlugin>) {
        let name = plugin.name().to_string();
        info!(plugin = %name, "registering channel plugin");
        self.plugins.insert(name, plugin);
    }

    /// Run every registered plugin's `initialize`, in registration order.
    /// A single plugin's failure is logged and does not block the rest —
    /// that plugin simply won't serve traffic until the gateway is
    /// restarted with the underlying problem fixed.
    pub async fn initialize_all(&self, host: PluginHost) {
        for (name, plugin) in self.plugins.iter() {
            if let Err(e) = plugin.initialize(host.clone()).await {
                error!(plugin = %name, error = %e, "plugin failed to initialize");
            }
        }
    }

    /// Shut down every registered plugin. Errors are logged but do not
    /// abort shutdown of the remaining plugins.
    pub async fn shutdown_all(&self) {
        for (name, plugin) in self.plugins.iter() {
            if let Err(e) = plugin.shutdown().await {
                warn!(plugin = %name, error = %e, "error while shutting down plugin");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ChannelPlugin>> {
        self.plugins.get(name).cloned()
    }

    /// All registered plugins, sorted by name for deterministic listing.
    pub fn summaries(&self) -> Vec<PluginSummary> {
        let mut out: Vec<PluginSummary> = self
            .plugins
            .values()
            .map(|p| PluginSummary {
                name: p.name().to_string(),
                display_name: p.display_name().to_string(),
                icon: p.icon().to_string(),
                version: p.version().to_string(),
                description: p.description().to_string(),
                route_prefix: p.route_prefix(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Aggregate health checks across every registered plugin, keyed by
    /// plugin name (spec §6 `GET /health` folds these in).
    pub async fn health_checks(&self) -> HashMap<String, HashMap<String, String>> {
        let mut out = HashMap::new();
        for (name, plugin) in self.plugins.iter() {
            out.insert(name.clone(), plugin.health_check().await);
        }
        out
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

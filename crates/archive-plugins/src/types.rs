use std::sync::Arc;

use archive_ingest::IngestDeps;
use archive_settings::SettingsStore;

/// Handed to every plugin at `initialize` time so it can register its
/// default settings, read its own configuration back, and hand completed
/// items to the ingestion pipeline. Cheaply `Clone`d (everything inside is
/// an `Arc`) so a plugin can stash its own copy for later webhook calls.
#[derive(Clone)]
pub struct PluginHost {
    pub settings: Arc<SettingsStore>,
    pub ingest: Arc<IngestDeps>,
}

impl PluginHost {
    pub fn new(settings: Arc<SettingsStore>, ingest: Arc<IngestDeps>) -> Self {
        Self { settings, ingest }
    }

    /// Read one of this plugin's own settings back (e.g.
    /// `waha_base_url`), falling back to `default` if unset.
    pub fn setting(&self, key: &str, default: &str) -> String {
        self.settings
            .get(key)
            .ok()
            .flatten()
            .map(|s| s.value)
            .unwrap_or_else(|| default.to_string())
    }
}

/// Snapshot of one registered plugin's identity, used to render the
/// settings UI's channel list (spec §6 `GET /plugins`-adjacent reads).
#[derive(Debug, Clone, serde::Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub display_name: String,
    pub icon: String,
    pub version: String,
    pub description: String,
    pub route_prefix: String,
}

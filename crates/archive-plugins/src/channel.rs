use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use archive_ingest::SourceItem;
use archive_settings::SettingDefault;

use crate::error::PluginError;
use crate::types::PluginHost;

/// The capability set every channel plugin (WhatsApp, documents, call
/// recordings, …) implements, ported from `ChannelPlugin` in the original
/// system's `plugins/base.py`: identity metadata, the settings it
/// contributes, a lifecycle pair, a health check, and the two entry points
/// the gateway drives it through — an inbound webhook and a scheduled pull.
///
/// Implementations must be `Send + Sync`: the registry holds them behind a
/// single shared `Arc` and calls into them from webhook handlers and the
/// scheduler tick concurrently.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Stable lowercase identifier (e.g. `"whatsapp"`). Used as the registry
    /// key and as the `source` tag on every chunk this plugin ingests.
    fn name(&self) -> &str;

    fn display_name(&self) -> &str;

    /// A short emoji or glyph for the settings UI's channel list.
    fn icon(&self) -> &str;

    fn version(&self) -> &str;

    fn description(&self) -> &str;

    /// Settings this plugin contributes at enable time (spec §4.1
    /// `RegisterDefaults`). Additive only — the store never overwrites an
    /// existing row, so disabling and re-enabling a plugin preserves edits.
    fn default_settings(&self) -> Vec<SettingDefault>;

    /// HTTP path prefix this plugin's routes are mounted under. Defaults to
    /// `/plugins/<name>`; a plugin only overrides this if it needs a legacy
    /// alias (WhatsApp's bare `/webhook` route is handled by the gateway
    /// router directly, not by overriding this).
    fn route_prefix(&self) -> String {
        format!("/plugins/{}", self.name())
    }

    /// One-time setup: register default settings, validate configuration,
    /// and stash `host` for later webhook/sync calls. Called once per
    /// enabled plugin at gateway startup.
    async fn initialize(&self, host: PluginHost) -> Result<(), PluginError>;

    /// Release any held resources. Called at gateway shutdown; errors are
    /// logged but never block the remaining plugins from shutting down.
    async fn shutdown(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Upstream connectivity check surfaced on `GET /plugins/<name>/status`
    /// and aggregated into `GET /health`.
    async fn health_check(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Handle one inbound webhook payload. Returns the [`SourceItem`] to
    /// hand to the ingestion pipeline, or `None` if the payload was
    /// filtered out (read receipts, non-message events — the donor's
    /// `should_process` check folded into this return value rather than a
    /// separate method, since every caller immediately discards a filtered
    /// payload anyway). Plugins that have no webhook surface (pull-only
    /// sources) leave this at the default.
    async fn process_webhook(&self, _payload: Value) -> Result<Option<SourceItem>, PluginError> {
        Ok(None)
    }

    /// Pull-based sync, driven by the scheduler (spec §4.6 step 4). Returns
    /// the number of items ingested. Plugins with no periodic pull (pure
    /// webhook sources) leave this at the default.
    async fn scheduled_sync(&self) -> Result<usize, PluginError> {
        Ok(0)
    }
}

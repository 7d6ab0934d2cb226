//! `archive-plugin-documents` — a Paperless-ngx-shaped document channel
//! plugin. No single donor file grounds this one (the original system has
//! no standalone paperless plugin module), so it is built from the
//! `ChannelPlugin` lifecycle `archive-plugin-messaging` already establishes
//! plus the `paperless`/`documents` channel tag `archive-ingest::pii`
//! already carries a redaction policy for. This is a minimal
//! list-documents-and-ingest-content mapping, not a faithful Paperless-ngx
//! REST client (no correspondent/tag/custom-field modeling).

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use archive_core::error::ArchiveError;
use archive_ingest::SourceItem;
use archive_plugins::{ChannelPlugin, PluginError, PluginHost};
use archive_settings::{SettingDefault, SettingType};

#[derive(Debug, Deserialize)]
struct PaperlessDocument {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    correspondent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaperlessListResponse {
    results: Vec<PaperlessDocument>,
}

fn parse_created(created: &Option<String>) -> i64 {
    created
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

fn document_to_source_item(doc: &PaperlessDocument) -> SourceItem {
    SourceItem {
        text: doc.content.clone().unwrap_or_default(),
        source: "paperless".to_string(),
        source_native_id: doc.id.to_string(),
        sender: doc.correspondent.clone(),
        chat_id: None,
        chat_name: doc.title.clone(),
        is_group: false,
        timestamp: parse_created(&doc.created),
        media: None,
        thread_id: None,
        parent_native_id: None,
        sender_whatsapp_id: None,
    }
}

pub struct DocumentsPlugin {
    host: OnceLock<PluginHost>,
    base_url: OnceLock<String>,
    api_token: OnceLock<String>,
    last_seen_id: Mutex<Option<i64>>,
}

impl DocumentsPlugin {
    pub fn new() -> Self {
        Self {
            host: OnceLock::new(),
            base_url: OnceLock::new(),
            api_token: OnceLock::new(),
            last_seen_id: Mutex::new(None),
        }
    }

    async fn fetch_recent(&self) -> Result<Vec<PaperlessDocument>, PluginError> {
        let base_url = self.base_url.get().cloned().unwrap_or_default();
        let token = self.api_token.get().cloned().unwrap_or_default();
        if base_url.is_empty() {
            return Err(PluginError::ConfigError("documents.base_url is not set".to_string()));
        }
        let resp = reqwest::Client::new()
            .get(format!("{base_url}/api/documents/?ordering=-created"))
            .header("Authorization", format!("Token {token}"))
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
            .map_err(|e| PluginError::Unavailable(e.to_string()))?;
        let parsed: PaperlessListResponse = resp
            .json()
            .await
            .map_err(|e| PluginError::InvalidPayload(e.to_string()))?;
        Ok(parsed.results)
    }
}

impl Default for DocumentsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelPlugin for DocumentsPlugin {
    fn name(&self) -> &str {
        "documents"
    }

    fn display_name(&self) -> &str {
        "Documents"
    }

    fn icon(&self) -> &str {
        "📄"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Scanned-document archive via a Paperless-ngx-compatible REST API"
    }

    fn default_settings(&self) -> Vec<SettingDefault> {
        vec![
            SettingDefault {
                key: "documents.base_url".into(),
                default: "http://paperless:8000".into(),
                category: "plugins".into(),
                setting_type: SettingType::Text,
                description: "Paperless-ngx server URL".into(),
                select_options: vec![],
            },
            SettingDefault {
                key: "documents.api_token".into(),
                default: "".into(),
                category: "plugins".into(),
                setting_type: SettingType::Secret,
                description: "Paperless-ngx API token".into(),
                select_options: vec![],
            },
        ]
    }

    async fn initialize(&self, host: PluginHost) -> Result<(), PluginError> {
        host.settings
            .register_defaults(&self.default_settings())
            .map_err(|e| PluginError::ConfigError(e.to_string()))?;
        let _ = self.base_url.set(host.setting("documents.base_url", "http://paperless:8000"));
        let _ = self.api_token.set(host.setting("documents.api_token", ""));
        let _ = self.host.set(host);
        Ok(())
    }

    async fn health_check(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        match self.fetch_recent().await {
            Ok(_) => {
                out.insert("paperless".to_string(), "connected".to_string());
            }
            Err(e) => {
                out.insert("paperless".to_string(), format!("error: {e}"));
            }
        }
        out
    }

    /// Paperless "consumption finished" webhooks deliver `{"document": {...}}`.
    async fn process_webhook(&self, payload: Value) -> Result<Option<SourceItem>, PluginError> {
        let doc_value = payload.get("document").cloned().unwrap_or(payload);
        let doc: PaperlessDocument =
            serde_json::from_value(doc_value).map_err(|e| PluginError::InvalidPayload(e.to_string()))?;
        Ok(Some(document_to_source_item(&doc)))
    }

    /// Pull-based sync: list documents newer than the last-seen id and hand
    /// each to the ingestion pipeline directly (spec §4.6 step 4).
    async fn scheduled_sync(&self) -> Result<usize, PluginError> {
        let host = self
            .host
            .get()
            .ok_or_else(|| PluginError::ConfigError("plugin not initialized".to_string()))?;
        let documents = self.fetch_recent().await?;

        let mut last_seen = self.last_seen_id.lock().unwrap();
        let threshold = *last_seen;
        let mut new_max = threshold;
        let mut ingested = 0usize;

        for doc in documents.iter().rev() {
            if let Some(seen) = threshold {
                if doc.id <= seen {
                    continue;
                }
            }
            let item = document_to_source_item(doc);
            match archive_ingest::ingest(&host.ingest, item).await {
                Ok(_) => ingested += 1,
                Err(ArchiveError::ExternalUnavailable(msg)) => {
                    warn!(error = %msg, document_id = doc.id, "transient failure ingesting document, will retry next sync");
                    continue;
                }
                Err(e) => warn!(error = %e, document_id = doc.id, "failed to ingest document"),
            }
            new_max = Some(new_max.map_or(doc.id, |m| m.max(doc.id)));
        }
        *last_seen = new_max;
        Ok(ingested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_created_timestamp() {
        let ts = parse_created(&Some("2024-01-15T10:30:00Z".to_string()));
        assert!(ts > 0);
    }

    #[test]
    fn missing_created_defaults_to_zero() {
        assert_eq!(parse_created(&None), 0);
    }

    #[test]
    fn document_maps_title_into_chat_name() {
        let doc = PaperlessDocument {
            id: 42,
            title: Some("Lease agreement".to_string()),
            content: Some("terms...".to_string()),
            created: None,
            correspondent: Some("Landlord Co".to_string()),
        };
        let item = document_to_source_item(&doc);
        assert_eq!(item.chat_name.as_deref(), Some("Lease agreement"));
        assert_eq!(item.source_native_id, "42");
        assert_eq!(item.sender.as_deref(), Some("Landlord Co"));
    }
}

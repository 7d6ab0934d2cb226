//! `archive-plugin-messaging` — a WhatsApp-shaped messaging channel plugin,
//! ported from `original_source/src/plugins/whatsapp/plugin.py`'s webhook
//! handling against a WAHA-style (WhatsApp HTTP API) backend. This is a
//! minimal payload mapping, not a full WAHA client — it maps the handful of
//! fields `process_webhook` needs into a [`SourceItem`] and leaves richer
//! parsing (media download, vCard contacts, reactions) unimplemented.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use archive_ingest::{MediaInfo, SourceItem};
use archive_plugins::{ChannelPlugin, PluginError, PluginHost};
use archive_settings::{SettingDefault, SettingType};

/// Raw WAHA webhook payload shape (the subset this plugin reads). WAHA's
/// actual payload carries many more fields (`ack`, `vCards`, `location`,
/// …); only the ones needed to populate a [`SourceItem`] are modeled here.
#[derive(Debug, Deserialize)]
struct WahaPayload {
    event: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(rename = "fromMe", default)]
    from_me: bool,
    #[serde(rename = "notifyName", default)]
    notify_name: Option<String>,
    #[serde(rename = "hasMedia", default)]
    has_media: bool,
    #[serde(default)]
    media: Option<WahaMedia>,
    #[serde(rename = "_data", default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WahaMedia {
    mimetype: Option<String>,
    url: Option<String>,
}

fn should_process(payload: &Value) -> bool {
    if payload.get("event").and_then(Value::as_str) == Some("message_ack") {
        return false;
    }
    let from = payload.get("from").and_then(Value::as_str).unwrap_or("");
    if from.ends_with("@newsletter") || from.ends_with("@broadcast") {
        return false;
    }
    let data_type = payload
        .get("_data")
        .and_then(|d| d.get("type"))
        .and_then(Value::as_str);
    !matches!(data_type, Some("e2e_notification") | Some("notification_template"))
}

fn media_kind_from_mime(mime: &str) -> &'static str {
    if mime.starts_with("image/") {
        "image"
    } else if mime.starts_with("audio/") {
        "voice"
    } else if mime.starts_with("video/") {
        "video"
    } else {
        "document"
    }
}

pub struct MessagingPlugin {
    waha_base_url: std::sync::OnceLock<String>,
}

impl MessagingPlugin {
    pub fn new() -> Self {
        Self { waha_base_url: std::sync::OnceLock::new() }
    }
}

impl Default for MessagingPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelPlugin for MessagingPlugin {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn display_name(&self) -> &str {
        "WhatsApp"
    }

    fn icon(&self) -> &str {
        "💬"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "WhatsApp messaging via a WAHA-compatible HTTP API"
    }

    fn default_settings(&self) -> Vec<SettingDefault> {
        vec![
            SettingDefault {
                key: "whatsapp.waha_base_url".into(),
                default: "http://waha:3000".into(),
                category: "plugins".into(),
                setting_type: SettingType::Text,
                description: "WAHA server URL".into(),
                select_options: vec![],
            },
            SettingDefault {
                key: "whatsapp.waha_api_key".into(),
                default: "".into(),
                category: "plugins".into(),
                setting_type: SettingType::Secret,
                description: "WAHA API key".into(),
                select_options: vec![],
            },
            SettingDefault {
                key: "whatsapp.waha_session_name".into(),
                default: "default".into(),
                category: "plugins".into(),
                setting_type: SettingType::Text,
                description: "WAHA WhatsApp session name".into(),
                select_options: vec![],
            },
        ]
    }

    async fn initialize(&self, host: PluginHost) -> Result<(), PluginError> {
        host.settings
            .register_defaults(&self.default_settings())
            .map_err(|e| PluginError::ConfigError(e.to_string()))?;
        let base_url = host.setting("whatsapp.waha_base_url", "http://waha:3000");
        let _ = self.waha_base_url.set(base_url);
        Ok(())
    }

    async fn health_check(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        let base_url = self.waha_base_url.get().cloned().unwrap_or_default();
        if base_url.is_empty() {
            out.insert("waha".to_string(), "not initialized".to_string());
            return out;
        }
        match reqwest::Client::new()
            .get(format!("{base_url}/api/sessions"))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().as_u16() < 500 => {
                out.insert("waha".to_string(), "connected".to_string());
            }
            Ok(resp) => {
                out.insert("waha".to_string(), format!("error: HTTP {}", resp.status()));
            }
            Err(e) => {
                out.insert("waha".to_string(), format!("error: {e}"));
            }
        }
        out
    }

    async fn process_webhook(&self, payload: Value) -> Result<Option<SourceItem>, PluginError> {
        let inner = payload.get("payload").cloned().unwrap_or(payload);
        if !should_process(&inner) {
            return Ok(None);
        }
        let parsed: WahaPayload = serde_json::from_value(inner)
            .map_err(|e| PluginError::InvalidPayload(e.to_string()))?;
        if parsed.event.as_deref() == Some("message_ack") {
            return Ok(None);
        }

        let from = parsed.from.clone().unwrap_or_default();
        if from.is_empty() {
            return Ok(None);
        }
        let is_group = from.ends_with("@g.us");
        let timestamp = parsed.timestamp.unwrap_or(0);
        let source_native_id = parsed
            .data
            .as_ref()
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| format!("{from}:{timestamp}"));

        let media = if parsed.has_media {
            parsed.media.map(|m| {
                let mime = m.mimetype.unwrap_or_default();
                MediaInfo {
                    media_type: media_kind_from_mime(&mime).to_string(),
                    media_url: m.url,
                    media_path: None,
                }
            })
        } else {
            None
        };

        Ok(Some(SourceItem {
            text: parsed.body.unwrap_or_default(),
            source: "whatsapp".to_string(),
            source_native_id,
            sender: Some(parsed.notify_name.unwrap_or_else(|| from.clone())),
            chat_id: Some(from.clone()),
            chat_name: None,
            is_group,
            timestamp,
            media,
            thread_id: Some(from),
            parent_native_id: None,
            sender_whatsapp_id: parsed.from.filter(|_| !parsed.from_me),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ack_events_are_filtered() {
        let payload = serde_json::json!({"event": "message_ack"});
        assert!(!should_process(&payload));
    }

    #[test]
    fn newsletter_senders_are_filtered() {
        let payload = serde_json::json!({"from": "123@newsletter"});
        assert!(!should_process(&payload));
    }

    #[test]
    fn ordinary_messages_pass() {
        let payload = serde_json::json!({"from": "1234567890@c.us", "body": "hi"});
        assert!(should_process(&payload));
    }

    #[test]
    fn media_kind_maps_from_mime_type() {
        assert_eq!(media_kind_from_mime("image/jpeg"), "image");
        assert_eq!(media_kind_from_mime("audio/ogg"), "voice");
        assert_eq!(media_kind_from_mime("application/pdf"), "document");
    }
}

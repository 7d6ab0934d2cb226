//! `archive-plugin-callrec` — a transcribed-call-recording channel plugin,
//! grounded on `original_source/src/models/call_recording.py`'s
//! `CallRecordingDocument`/`CallType`. Actual audio transcription
//! (Whisper/AssemblyAI, see `original_source/src/plugins/call_recordings/`)
//! is out of scope here (§1 Non-goals: no vendor-API parser fidelity) — this
//! plugin only accepts an already-transcribed call as a webhook payload and
//! maps it into a [`SourceItem`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use archive_ingest::{MediaInfo, SourceItem};
use archive_plugins::{ChannelPlugin, PluginError, PluginHost};
use archive_settings::{SettingDefault, SettingType};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum CallType {
    Incoming,
    Outgoing,
    Conference,
    Voicemail,
    Unknown,
}

impl Default for CallType {
    fn default() -> Self {
        CallType::Unknown
    }
}

impl CallType {
    fn label(self) -> &'static str {
        match self {
            CallType::Incoming => "incoming call",
            CallType::Outgoing => "outgoing call",
            CallType::Conference => "conference call",
            CallType::Voicemail => "voicemail",
            CallType::Unknown => "call",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallRecordingPayload {
    recording_id: String,
    transcript: String,
    #[serde(default)]
    duration_seconds: i64,
    #[serde(default)]
    participants: Vec<String>,
    #[serde(default)]
    call_type: CallType,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    audio_file_path: Option<String>,
    #[serde(default)]
    audio_format: Option<String>,
    #[serde(default)]
    recorded_at: Option<String>,
}

fn parse_recorded_at(recorded_at: &Option<String>) -> i64 {
    recorded_at
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

fn call_recording_to_source_item(payload: &CallRecordingPayload) -> SourceItem {
    let duration_min = payload.duration_seconds / 60;
    let duration_sec = payload.duration_seconds % 60;
    let header = format!(
        "{} ({} participant(s), {}m{:02}s):",
        payload.call_type.label(),
        payload.participants.len().max(1),
        duration_min,
        duration_sec
    );
    let text = format!("{header}\n{}", payload.transcript);

    let sender = payload
        .phone_number
        .clone()
        .or_else(|| payload.participants.first().cloned());

    SourceItem {
        text,
        source: "callrec".to_string(),
        source_native_id: payload.recording_id.clone(),
        sender,
        chat_id: None,
        chat_name: None,
        is_group: payload.participants.len() > 2 || payload.call_type == CallType::Conference,
        timestamp: parse_recorded_at(&payload.recorded_at),
        media: payload.audio_file_path.as_ref().map(|path| MediaInfo {
            media_type: "voice".to_string(),
            media_url: None,
            media_path: Some(path.clone()),
        }),
        thread_id: None,
        parent_native_id: None,
        sender_whatsapp_id: None,
    }
    .with_audio_format(payload.audio_format.as_deref())
}

/// Small extension so the audio format (when present) can be folded into
/// the text without adding a field `SourceItem` has no other use for.
trait WithAudioFormat {
    fn with_audio_format(self, format: Option<&str>) -> Self;
}

impl WithAudioFormat for SourceItem {
    fn with_audio_format(mut self, format: Option<&str>) -> Self {
        if let Some(format) = format {
            self.text = format!("{} [{}]", self.text, format);
        }
        self
    }
}

pub struct CallRecordingPlugin {
    #[allow(dead_code)]
    host: std::sync::OnceLock<PluginHost>,
}

impl CallRecordingPlugin {
    pub fn new() -> Self {
        Self { host: std::sync::OnceLock::new() }
    }
}

impl Default for CallRecordingPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelPlugin for CallRecordingPlugin {
    fn name(&self) -> &str {
        "callrec"
    }

    fn display_name(&self) -> &str {
        "Call Recordings"
    }

    fn icon(&self) -> &str {
        "📞"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Transcribed phone call recordings delivered by an external transcription worker"
    }

    fn default_settings(&self) -> Vec<SettingDefault> {
        vec![SettingDefault {
            key: "callrec.min_confidence".into(),
            default: "0.5".into(),
            category: "plugins".into(),
            setting_type: SettingType::Text,
            description: "Minimum transcription confidence to accept a recording".into(),
            select_options: vec![],
        }]
    }

    async fn initialize(&self, host: PluginHost) -> Result<(), PluginError> {
        host.settings
            .register_defaults(&self.default_settings())
            .map_err(|e| PluginError::ConfigError(e.to_string()))?;
        let _ = self.host.set(host);
        Ok(())
    }

    async fn health_check(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        out.insert("callrec".to_string(), "webhook-only, no upstream connection".to_string());
        out
    }

    async fn process_webhook(&self, payload: Value) -> Result<Option<SourceItem>, PluginError> {
        let inner = payload.get("recording").cloned().unwrap_or(payload);
        let parsed: CallRecordingPayload =
            serde_json::from_value(inner).map_err(|e| PluginError::InvalidPayload(e.to_string()))?;
        if parsed.transcript.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(call_recording_to_source_item(&parsed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CallRecordingPayload {
        CallRecordingPayload {
            recording_id: "rec-1".to_string(),
            transcript: "hello, can you call me back?".to_string(),
            duration_seconds: 95,
            participants: vec!["+15551234567".to_string()],
            call_type: CallType::Incoming,
            phone_number: Some("+15551234567".to_string()),
            audio_file_path: Some("/recordings/rec-1.wav".to_string()),
            audio_format: Some("wav".to_string()),
            recorded_at: Some("2024-02-01T08:00:00Z".to_string()),
        }
    }

    #[test]
    fn maps_call_type_and_duration_into_header() {
        let item = call_recording_to_source_item(&sample());
        assert!(item.text.starts_with("incoming call (1 participant(s), 1m35s):"));
        assert!(item.text.contains("hello, can you call me back?"));
        assert!(item.text.ends_with("[wav]"));
    }

    #[test]
    fn conference_with_many_participants_marks_group() {
        let mut payload = sample();
        payload.call_type = CallType::Conference;
        payload.participants = vec!["a".into(), "b".into(), "c".into()];
        let item = call_recording_to_source_item(&payload);
        assert!(item.is_group);
    }

    #[test]
    fn phone_number_preferred_over_first_participant() {
        let item = call_recording_to_source_item(&sample());
        assert_eq!(item.sender.as_deref(), Some("+15551234567"));
    }

    #[test]
    fn whitespace_only_transcript_is_detected_as_blank() {
        let mut payload = sample();
        payload.transcript = "   ".to_string();
        assert!(payload.transcript.trim().is_empty());
    }
}

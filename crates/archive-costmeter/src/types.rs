use chrono::{DateTime, Utc};
use serde::Serialize;

/// The four billable call kinds the pricing table prices differently
/// (spec §3 / §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Chat,
    Embed,
    Whisper,
    Image,
    /// Cross-encoder rerank calls (spec §4.8 step 6: "also cost-tracked
    /// when applicable"); priced the same way as chat when a `rerank`
    /// entry exists in the pricing table, otherwise free.
    Rerank,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Chat => "chat",
            EventKind::Embed => "embed",
            EventKind::Whisper => "whisper",
            EventKind::Image => "image",
            EventKind::Rerank => "rerank",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(EventKind::Chat),
            "embed" => Ok(EventKind::Embed),
            "whisper" => Ok(EventKind::Whisper),
            "image" => Ok(EventKind::Image),
            "rerank" => Ok(EventKind::Rerank),
            other => Err(format!("unknown cost event kind: {other}")),
        }
    }
}

/// A single billable LLM/embedding/transcription/image call (spec §3).
#[derive(Debug, Clone, Serialize)]
pub struct CostEvent {
    pub ts: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub kind: EventKind,
    pub in_tokens: u32,
    pub out_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub conversation_id: Option<String>,
    pub request_context: Option<String>,
}

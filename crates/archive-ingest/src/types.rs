//! The ingestion pipeline's input/output shapes (spec §4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub media_type: String,
    pub media_url: Option<String>,
    pub media_path: Option<String>,
}

/// A single unit of content handed to the pipeline by a channel plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub text: String,
    pub source: String,
    pub source_native_id: String,
    pub sender: Option<String>,
    pub chat_id: Option<String>,
    pub chat_name: Option<String>,
    pub is_group: bool,
    pub timestamp: i64,
    pub media: Option<MediaInfo>,
    pub thread_id: Option<String>,
    pub parent_native_id: Option<String>,
    pub sender_whatsapp_id: Option<String>,
}

impl SourceItem {
    pub fn base_source_id(&self) -> String {
        format!("{}:{}", self.source, self.source_native_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub chunks_written: usize,
    pub skipped_duplicate: bool,
    pub extraction_dispatched: bool,
}

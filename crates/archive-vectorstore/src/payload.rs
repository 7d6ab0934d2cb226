use serde::{Deserialize, Serialize};

/// Semantic kind of the ingested chunk (spec §3 "Content chunk").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Voice,
    Document,
    CallRecording,
    ConversationChunk,
}

/// The typed payload stored alongside each chunk's dense+sparse vectors
/// (spec §3). Every field has a fixed semantic type; nothing here is a
/// free-form bag. `source` is left as a string rather than a closed enum —
/// the spec lists `whatsapp | gmail | paperless | call_recording | manual |
/// …` with an explicit ellipsis, and new channel plugins register their own
/// source tag without a recompile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub source_id: String,
    pub source: String,
    pub content_type: ContentType,
    pub text: String,

    pub sender: Option<String>,
    pub chat_id: Option<String>,
    pub chat_name: Option<String>,
    pub is_group: bool,
    pub timestamp: i64,
    pub language: Option<String>,

    pub has_media: bool,
    pub media_type: Option<String>,
    pub media_url: Option<String>,
    pub media_path: Option<String>,

    pub chunk_index: Option<u32>,
    pub chunk_total: Option<u32>,

    pub asset_id: String,
    pub parent_asset_id: Option<String>,
    pub thread_id: Option<String>,
    pub chunk_group_id: Option<String>,

    pub person_ids: Vec<i64>,
    pub mentioned_person_ids: Vec<i64>,
}

impl ChunkPayload {
    /// Invariant (c): `0 ≤ chunk_index < chunk_total` when chunked.
    pub fn chunk_index_valid(&self) -> bool {
        match (self.chunk_index, self.chunk_total) {
            (Some(idx), Some(total)) => idx < total,
            (None, None) | (None, Some(_)) => true,
            (Some(_), None) => false,
        }
    }
}

/// `asset_id = prefix(source) + ':' + source_native_id` (spec §4.5 step 4).
pub fn generate_asset_id(source: &str, native_id: &str) -> String {
    format!("{source}:{native_id}")
}

#[derive(Debug, Clone)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Str(s.to_string())
    }
}
impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Int(i)
    }
}
impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

/// One payload predicate (spec §4.4: "ordered predicates... equality,
/// set-membership, range (for timestamp), and negation").
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq(String, FilterValue),
    In(String, Vec<FilterValue>),
    Range { field: String, gte: Option<i64>, lte: Option<i64> },
    Not(Box<Predicate>),
}

/// An ordered, AND-combined set of predicates. Applied identically to both
/// the dense and sparse sub-queries before RRF fusion so filter semantics
/// survive the merge (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct SearchFilter(pub Vec<Predicate>);

impl SearchFilter {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(mut self, predicate: Predicate) -> Self {
        self.0.push(predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

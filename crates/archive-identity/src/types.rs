use chrono::{DateTime, Utc};
use serde::Serialize;

/// A resolved individual (spec §3 "Identity graph"). `aliases` accumulates
/// every name variant a sender has ever been seen under; `phone`/`email`/
/// `channel_id` are the identifiers the resolution cascade matches on and
/// must stay unique across the store.
#[derive(Debug, Clone, Serialize)]
pub struct Person {
    pub id: i64,
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub channel_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactStatus {
    Active,
    Retired,
}

impl std::fmt::Display for FactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactStatus::Active => write!(f, "active"),
            FactStatus::Retired => write!(f, "retired"),
        }
    }
}

impl std::str::FromStr for FactStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(FactStatus::Active),
            "retired" => Ok(FactStatus::Retired),
            other => Err(format!("unknown fact status: {other}")),
        }
    }
}

/// A time-invariant claim about a person (spec §3). Derived time-variant
/// values like age are never stored here (P8) — only the quantity they're
/// computed from (e.g. `birth_date`).
#[derive(Debug, Clone, Serialize)]
pub struct Fact {
    pub id: i64,
    pub person_id: i64,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub source_type: String,
    pub source_ref: String,
    pub source_quote: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_confirmed: DateTime<Utc>,
    pub status: FactStatus,
}

/// Typed relation between two persons. Symmetric pairs (`spouse`,
/// `sibling`, `coworker`) are stored once; directional ones (`parent` /
/// `child`) carry meaning in `person_a` → `person_b` order.
#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub id: i64,
    pub person_a: i64,
    pub person_b: i64,
    pub relation_type: String,
    pub confidence: f64,
    pub source_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    Sender,
    Participant,
    Mentioned,
}

impl std::fmt::Display for AssetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetRole::Sender => write!(f, "sender"),
            AssetRole::Participant => write!(f, "participant"),
            AssetRole::Mentioned => write!(f, "mentioned"),
        }
    }
}

impl std::str::FromStr for AssetRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sender" => Ok(AssetRole::Sender),
            "participant" => Ok(AssetRole::Participant),
            "mentioned" => Ok(AssetRole::Mentioned),
            other => Err(format!("unknown asset role: {other}")),
        }
    }
}

/// `(person_id, asset_type, asset_ref, role)` link (spec §3). Unique on
/// `(person_id, asset_ref, role)`; duplicates are silently ignored.
#[derive(Debug, Clone, Serialize)]
pub struct PersonAssetLink {
    pub id: i64,
    pub person_id: i64,
    pub asset_type: String,
    pub asset_ref: String,
    pub role: AssetRole,
    pub confidence: f64,
}

/// Edge between two assets (attachment, thread membership, reply chain,
/// …). Unique on `(src_asset_ref, dst_asset_ref, relation_type)`.
#[derive(Debug, Clone, Serialize)]
pub struct AssetAssetEdge {
    pub id: i64,
    pub src_asset_ref: String,
    pub dst_asset_ref: String,
    pub relation_type: String,
    pub provenance: String,
}

/// Dedup log entry used to skip re-extracting an already-processed source
/// (spec §3 "Extraction dedup log").
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionLogEntry {
    pub source_ref: String,
    pub source_type: String,
    pub fact_count: i64,
    pub extracted_at: DateTime<Utc>,
}

/// Identifiers optionally known at resolution time (spec §4.3
/// `FindOrCreatePerson`).
#[derive(Debug, Clone, Default)]
pub struct PersonIdentifiers {
    pub whatsapp_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Top-level process configuration — `archive.toml` plus `ARCHIVE_*` env
/// overrides. This is the boot-time config layer; it is distinct from the
/// Settings Store (C1), which is the live, DB-backed, per-key config that
/// seeds itself from this struct's `seed` section once at first start and
/// then ignores the environment entirely (see spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vectorstore: VectorStoreConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            vectorstore: VectorStoreConfig::default(),
            providers: ProvidersConfig::default(),
            plugins: PluginsConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            log_level: default_log_level(),
        }
    }
}

/// Paths to the two embedded SQLite files. Per spec §5 both the settings DB
/// and identity DB may share one file; kept as separate paths so a future
/// split is a config change, not a migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub settings_path: String,
    #[serde(default = "default_db_path")]
    pub identity_path: String,
    #[serde(default = "default_tasks_db_path")]
    pub tasks_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            settings_path: default_db_path(),
            identity_path: default_db_path(),
            tasks_path: default_tasks_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Dimension of the configured embedding model's dense vector. Defaults
    /// to `text-embedding-3-large`'s 3072; override if `providers.openai.embed_model`
    /// is changed to a model with a different output size.
    #[serde(default = "default_dense_dim")]
    pub dense_dim: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            dense_dim: default_dense_dim(),
        }
    }
}

/// Directories the gateway serves generated media from (spec §6
/// `GET /media/images/<name>` / `GET /media/events/<name>`). Not part of
/// spec.md's distillation — added because the retrieval engine's rich-content
/// post-processing (§4.8) writes ICS files and references inline images that
/// something has to serve back over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_images_dir")]
    pub images_dir: String,
    #[serde(default = "default_events_dir")]
    pub events_dir: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            events_dir: default_events_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub openai: Option<OpenAiProviderConfig>,
    pub anthropic: Option<AnthropicProviderConfig>,
    /// Additional OpenAI-compatible chat/embedding providers, tried in order
    /// after the primary slot on retriable failure (see archive-llm router).
    #[serde(default)]
    pub openai_compat: Vec<OpenAiCompatEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicProviderConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiCompatEntry {
    pub id: String,
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
}

/// Which channel plugins are compiled in and enabled at boot. Per spec
/// §4.6, `enabled` is actually owned by the Settings Store once seeded;
/// this section only supplies the first-boot seed value per plugin name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PluginsConfig {
    #[serde(default)]
    pub enabled_by_default: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.archive/archive.db", home)
}
fn default_tasks_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.archive/tasks.db", home)
}
fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection() -> String {
    "archive_chunks".to_string()
}
fn default_dense_dim() -> u64 {
    3072
}
fn default_images_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.archive/media/images", home)
}
fn default_events_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.archive/media/events", home)
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-3-large".to_string()
}

impl ArchiveConfig {
    /// Load config from a TOML file with `ARCHIVE_*` env var overrides.
    ///
    /// Env vars only affect this boot-time layer. The Settings Store (C1)
    /// reads its own seed values independently and, after first boot,
    /// ignores the environment entirely — see spec §4.1.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ArchiveConfig = Figment::from(figment::providers::Serialized::defaults(
            ArchiveConfig::default(),
        ))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("ARCHIVE_").split("_"))
        .extract()
        .map_err(|e| ArchiveError::InvalidInput(format!("config: {e}")))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.archive/archive.toml", home)
}

use crate::types::{SettingDefault, SettingType};

/// Built-in default settings, seeded once at first boot (spec §4.1). Mirrors
/// the original system's `settings_db.py` default table: provider keys,
/// retrieval tuning knobs, and display preferences.
pub fn built_in_defaults() -> Vec<SettingDefault> {
    use SettingType::*;
    vec![
        SettingDefault {
            key: "llm.chat_model".into(),
            default: "gpt-4o-mini".into(),
            category: "providers".into(),
            setting_type: Text,
            description: "Default chat/synthesis model".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "llm.embed_model".into(),
            default: "text-embedding-3-large".into(),
            category: "providers".into(),
            setting_type: Text,
            description: "Default embedding model".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "llm.openai_api_key".into(),
            default: "".into(),
            category: "providers".into(),
            setting_type: Secret,
            description: "OpenAI API key".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "llm.anthropic_api_key".into(),
            default: "".into(),
            category: "providers".into(),
            setting_type: Secret,
            description: "Anthropic API key".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "retrieval.default_k".into(),
            default: "15".into(),
            category: "retrieval".into(),
            setting_type: Int,
            description: "Number of chunks retrieved before reranking".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "retrieval.min_score".into(),
            default: "0.2".into(),
            category: "retrieval".into(),
            setting_type: Float,
            description: "Minimum normalized fused-score cutoff (0-1 scale, 1.0 = top rank in every sub-query)".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "retrieval.rerank_enabled".into(),
            default: "false".into(),
            category: "retrieval".into(),
            setting_type: Bool,
            description: "Enable cross-encoder reranking when ≥5 candidates".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "retrieval.rerank_model".into(),
            default: "rerank-english-v3.0".into(),
            category: "retrieval".into(),
            setting_type: Text,
            description: "Cross-encoder rerank model name".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "display.timezone".into(),
            default: "UTC".into(),
            category: "display".into(),
            setting_type: Select,
            description: "Timezone used for prompt dates and ICS events".into(),
            select_options: vec!["UTC".into(), "America/New_York".into(), "Asia/Jerusalem".into()],
        },
        SettingDefault {
            key: "pii.redaction_enabled".into(),
            default: "true".into(),
            category: "privacy".into(),
            setting_type: Bool,
            description: "Route ingested text through the PII redactor".into(),
            select_options: vec![],
        },
        SettingDefault {
            key: "pii.action".into(),
            default: "replace".into(),
            category: "privacy".into(),
            setting_type: Select,
            description: "PII handling action".into(),
            select_options: vec!["redact".into(), "replace".into(), "hash".into()],
        },
    ]
}

/// Built-in category display metadata (SPEC_FULL supplement, `CATEGORY_META`).
pub fn built_in_categories() -> Vec<crate::types::CategoryMeta> {
    vec![
        crate::types::CategoryMeta {
            id: "providers".into(),
            label: "LLM Providers".into(),
            sort_order: 0,
        },
        crate::types::CategoryMeta {
            id: "retrieval".into(),
            label: "Retrieval".into(),
            sort_order: 1,
        },
        crate::types::CategoryMeta {
            id: "privacy".into(),
            label: "Privacy".into(),
            sort_order: 2,
        },
        crate::types::CategoryMeta {
            id: "plugins".into(),
            label: "Channels".into(),
            sort_order: 3,
        },
        crate::types::CategoryMeta {
            id: "display".into(),
            label: "Display".into(),
            sort_order: 4,
        },
    ]
}

/// Env vars read once at first boot to overlay the just-seeded defaults
/// (spec §4.1 / §6). After the store exists, the environment is ignored.
pub fn env_overlay() -> Vec<(String, String)> {
    let mapping = [
        ("ARCHIVE_OPENAI_API_KEY", "llm.openai_api_key"),
        ("ARCHIVE_ANTHROPIC_API_KEY", "llm.anthropic_api_key"),
        ("ARCHIVE_CHAT_MODEL", "llm.chat_model"),
        ("ARCHIVE_EMBED_MODEL", "llm.embed_model"),
        ("ARCHIVE_TIMEZONE", "display.timezone"),
    ];
    mapping
        .iter()
        .filter_map(|(env_key, setting_key)| {
            std::env::var(env_key)
                .ok()
                .map(|v| (setting_key.to_string(), v))
        })
        .collect()
}

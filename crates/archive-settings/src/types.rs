use serde::{Deserialize, Serialize};

/// Typed kind of a settings value (spec §4.1). Controls how `Store::get`
/// masks the row for display and how `select` options are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    Text,
    Secret,
    Int,
    Float,
    Bool,
    Select,
}

impl std::fmt::Display for SettingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SettingType::Text => "text",
            SettingType::Secret => "secret",
            SettingType::Int => "int",
            SettingType::Float => "float",
            SettingType::Bool => "bool",
            SettingType::Select => "select",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for SettingType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(SettingType::Text),
            "secret" => Ok(SettingType::Secret),
            "int" => Ok(SettingType::Int),
            "float" => Ok(SettingType::Float),
            "bool" => Ok(SettingType::Bool),
            "select" => Ok(SettingType::Select),
            other => Err(format!("unknown setting type: {other}")),
        }
    }
}

/// A single settings row as persisted (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub category: String,
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    pub description: String,
    pub updated_at: String,
}

impl Setting {
    /// Mask a secret value for display: `first4…last3`. Never applied on the
    /// read path used by plugins/providers — only when rendering to a UI.
    pub fn masked_value(&self) -> String {
        if self.setting_type != SettingType::Secret {
            return self.value.clone();
        }
        mask_secret(&self.value)
    }
}

pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 7 {
        return "*".repeat(chars.len());
    }
    let first: String = chars[..4].iter().collect();
    let last: String = chars[chars.len() - 3..].iter().collect();
    format!("{first}…{last}")
}

/// A definition a plugin (or the core) contributes at enable time via
/// `RegisterDefaults` (spec §4.1). Additive only — existing rows are never
/// overwritten, so disable+re-enable preserves user edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingDefault {
    pub key: String,
    pub default: String,
    pub category: String,
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    pub description: String,
    /// Fixed option list for `select`-typed settings (SPEC_FULL supplement).
    #[serde(default)]
    pub select_options: Vec<String>,
}

/// Category display metadata (SPEC_FULL supplement, ported from the
/// original `CATEGORY_META` table): a label and a sort order so
/// `GetCategories` doesn't fall back to alphabetical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMeta {
    pub id: String,
    pub label: String,
    pub sort_order: i64,
}

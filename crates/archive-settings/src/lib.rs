//! `archive-settings` (C1) — typed key/value config persisted in the
//! embedded settings DB, seeded from env once then edited live.

pub mod conversations;
pub mod db;
pub mod error;
pub mod seed;
pub mod store;
pub mod types;

pub use conversations::{Conversation, ConversationMessage};
pub use error::{Result, SettingsError};
pub use store::SettingsStore;
pub use types::{CategoryMeta, Setting, SettingDefault, SettingType};

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::db::init_db;
use crate::error::{Result, SettingsError};
use crate::seed::{built_in_defaults, env_overlay};
use crate::types::{CategoryMeta, Setting, SettingDefault, SettingType};

/// Typed key/value settings store (C1). Single embedded SQLite file behind a
/// mutex — per spec §5 writes serialize naturally and reads are
/// connection-per-request in spirit (we reuse one connection under a lock
/// rather than opening a new one per call, since rusqlite connections are
/// cheap to hold but not to reopen under WAL on every request).
pub struct SettingsStore {
    conn: Mutex<Connection>,
}

impl SettingsStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Seed built-in defaults, then overlay any value whose env var is set.
    /// Called once at first start (spec §4.1); a no-op on every later boot
    /// because `register_defaults` only inserts missing rows.
    pub fn seed_boot(&self) -> Result<()> {
        self.register_defaults(&built_in_defaults())?;
        for (key, value) in env_overlay() {
            // Overlay only applies if the row is still at its just-seeded
            // default value is not checked here — per spec, env vars are
            // read "once, at first start" before any user edits exist, so
            // a plain overwrite at boot-seed time is correct.
            self.set(&key, &value)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Setting>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT key, value, category, type, description, updated_at
                 FROM settings WHERE key = ?1",
                [key],
                row_to_setting,
            )
            .optional()?;
        Ok(row)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE settings SET value = ?1, updated_at = ?2 WHERE key = ?3",
            params![value, now, key],
        )?;
        if n == 0 {
            return Err(SettingsError::NotFound(format!("setting {key}")));
        }
        info!(%key, "setting updated");
        Ok(())
    }

    pub fn set_many(&self, values: &HashMap<String, String>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction()?;
        for (key, value) in values {
            tx.execute(
                "UPDATE settings SET value = ?1, updated_at = ?2 WHERE key = ?3",
                params![value, now, key],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_by_category(&self, category: &str) -> Result<Vec<Setting>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, value, category, type, description, updated_at
             FROM settings WHERE category = ?1 ORDER BY key",
        )?;
        let rows = stmt
            .query_map([category], row_to_setting)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn all(&self) -> Result<Vec<Setting>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, value, category, type, description, updated_at
             FROM settings ORDER BY category, key",
        )?;
        let rows = stmt
            .query_map([], row_to_setting)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Categories sorted by `category_meta.sort_order`, falling back to
    /// alphabetical for any category with no registered metadata.
    pub fn categories(&self) -> Result<Vec<CategoryMeta>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT s.category,
                    COALESCE(m.label, s.category) AS label,
                    COALESCE(m.sort_order, 1000) AS sort_order
             FROM settings s
             LEFT JOIN category_meta m ON m.id = s.category
             ORDER BY sort_order, label",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CategoryMeta {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    sort_order: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Reset one category (or all, when `category` is `None`) to built-in
    /// default values. Only touches keys with a known built-in default.
    pub fn reset_defaults(&self, category: Option<&str>) -> Result<()> {
        let defaults = built_in_defaults();
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for d in defaults.iter().filter(|d| match category {
            Some(cat) => d.category == cat,
            None => true,
        }) {
            tx.execute(
                "UPDATE settings SET value = ?1, updated_at = ?2 WHERE key = ?3",
                params![d.default, now, d.key],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Additive seeding used by plugins at enable time (spec §4.1). Rows
    /// are only inserted when missing — disable+re-enable never clobbers a
    /// user edit.
    pub fn register_defaults(&self, defaults: &[SettingDefault]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        for d in defaults {
            tx.execute(
                "INSERT INTO settings (key, value, category, type, description, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(key) DO NOTHING",
                params![
                    d.key,
                    d.default,
                    d.category,
                    d.setting_type.to_string(),
                    d.description,
                    now
                ],
            )?;
            for opt in &d.select_options {
                tx.execute(
                    "INSERT INTO select_options (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key, value) DO NOTHING",
                    params![d.key, opt],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn register_category(&self, meta: &CategoryMeta) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO category_meta (id, label, sort_order) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET label = excluded.label, sort_order = excluded.sort_order",
            params![meta.id, meta.label, meta.sort_order],
        )?;
        Ok(())
    }

    pub fn select_options(&self, key: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM select_options WHERE key = ?1 ORDER BY value")?;
        let rows = stmt
            .query_map([key], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }
}

fn row_to_setting(row: &rusqlite::Row<'_>) -> rusqlite::Result<Setting> {
    let type_str: String = row.get(3)?;
    Ok(Setting {
        key: row.get(0)?,
        value: row.get(1)?,
        category: row.get(2)?,
        setting_type: type_str.parse().unwrap_or(SettingType::Text),
        description: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SettingDefault;

    #[test]
    fn register_defaults_is_additive() {
        let store = SettingsStore::open_in_memory().unwrap();
        let defaults = vec![SettingDefault {
            key: "foo".into(),
            default: "1".into(),
            category: "general".into(),
            setting_type: SettingType::Int,
            description: "".into(),
            select_options: vec![],
        }];
        store.register_defaults(&defaults).unwrap();
        store.set("foo", "2").unwrap();
        // Re-registering (simulating disable+re-enable) must not clobber.
        store.register_defaults(&defaults).unwrap();
        assert_eq!(store.get("foo").unwrap().unwrap().value, "2");
    }

    #[test]
    fn secret_masking() {
        let s = Setting {
            key: "k".into(),
            value: "sk-abcdefgh123".into(),
            category: "c".into(),
            setting_type: SettingType::Secret,
            description: "".into(),
            updated_at: "".into(),
        };
        assert_eq!(s.masked_value(), "sk-a…123");
    }

    #[test]
    fn reset_defaults_restores_builtin_value() {
        let store = SettingsStore::open_in_memory().unwrap();
        store.seed_boot().unwrap();
        let all = store.all().unwrap();
        let key = all.first().unwrap().key.clone();
        store.set(&key, "mutated").unwrap();
        store.reset_defaults(None).unwrap();
        let restored = store.get(&key).unwrap().unwrap();
        assert_ne!(restored.value, "mutated");
    }
}

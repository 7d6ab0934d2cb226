use rusqlite::Connection;

use crate::error::Result;

/// Initialize the settings DB schema. Idempotent — safe on every boot.
///
/// Tables beyond the bare `settings` row (spec §3) are supplemented per
/// SPEC_FULL.md: `category_meta`/`select_options` (display ordering and
/// fixed option lists), `conversations`/`conversation_messages` (the
/// `/conversations` HTTP surface), and `cost_events` (the append-only
/// ledger C2 writes into, sharing this file per spec §6).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS settings (
            key         TEXT NOT NULL PRIMARY KEY,
            value       TEXT NOT NULL,
            category    TEXT NOT NULL,
            type        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS category_meta (
            id         TEXT NOT NULL PRIMARY KEY,
            label      TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS select_options (
            key   TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (key, value)
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id         TEXT NOT NULL PRIMARY KEY,
            title      TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            cost_usd        REAL NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conv_messages_conv
            ON conversation_messages (conversation_id, id);

        CREATE TABLE IF NOT EXISTS cost_events (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            ts               TEXT NOT NULL,
            provider         TEXT NOT NULL,
            model            TEXT NOT NULL,
            kind             TEXT NOT NULL,
            in_tokens        INTEGER NOT NULL DEFAULT 0,
            out_tokens       INTEGER NOT NULL DEFAULT 0,
            total_tokens     INTEGER NOT NULL DEFAULT 0,
            cost_usd         REAL NOT NULL DEFAULT 0,
            conversation_id  TEXT,
            request_context  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_cost_events_conv ON cost_events (conversation_id);
        CREATE INDEX IF NOT EXISTS idx_cost_events_ts ON cost_events (ts);
        ",
    )?;
    Ok(())
}

use rusqlite::Connection;

use archive_core::error::Result;

/// Ensure the `cost_events` table exists. Idempotent, and a no-op when
/// `archive-settings` already created it in the same file (spec §6: the
/// cost ledger shares the settings DB file).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(
        "
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

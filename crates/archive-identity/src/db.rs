use rusqlite::Connection;

use archive_core::error::Result;

/// Creates the identity/asset graph schema (spec §3). All tables are
/// `CREATE TABLE IF NOT EXISTS` so opening an existing store is a no-op.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS persons (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            canonical_name TEXT NOT NULL,
            aliases       TEXT NOT NULL DEFAULT '[]',
            phone         TEXT UNIQUE,
            email         TEXT UNIQUE,
            channel_id    TEXT UNIQUE,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS facts (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id      INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            key            TEXT NOT NULL,
            value          TEXT NOT NULL,
            confidence     REAL NOT NULL,
            source_type    TEXT NOT NULL,
            source_ref     TEXT NOT NULL,
            source_quote   TEXT,
            first_seen     TEXT NOT NULL,
            last_confirmed TEXT NOT NULL,
            status         TEXT NOT NULL DEFAULT 'active'
        );
        CREATE INDEX IF NOT EXISTS idx_facts_person_key ON facts (person_id, key, status);

        CREATE TABLE IF NOT EXISTS relationships (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            person_a      INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            person_b      INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            relation_type TEXT NOT NULL,
            confidence    REAL NOT NULL,
            source_ref    TEXT NOT NULL,
            UNIQUE(person_a, person_b, relation_type)
        );
        CREATE INDEX IF NOT EXISTS idx_relationships_a ON relationships (person_a);
        CREATE INDEX IF NOT EXISTS idx_relationships_b ON relationships (person_b);

        CREATE TABLE IF NOT EXISTS person_assets (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            person_id  INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            asset_type TEXT NOT NULL,
            asset_ref  TEXT NOT NULL,
            role       TEXT NOT NULL,
            confidence REAL NOT NULL,
            UNIQUE(person_id, asset_ref, role)
        );
        CREATE INDEX IF NOT EXISTS idx_person_assets_asset ON person_assets (asset_ref);

        CREATE TABLE IF NOT EXISTS asset_asset_edges (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            src_asset_ref   TEXT NOT NULL,
            dst_asset_ref   TEXT NOT NULL,
            relation_type   TEXT NOT NULL,
            provenance      TEXT NOT NULL,
            UNIQUE(src_asset_ref, dst_asset_ref, relation_type)
        );
        CREATE INDEX IF NOT EXISTS idx_edges_src ON asset_asset_edges (src_asset_ref);
        CREATE INDEX IF NOT EXISTS idx_edges_dst ON asset_asset_edges (dst_asset_ref);

        CREATE TABLE IF NOT EXISTS extractions (
            source_ref   TEXT PRIMARY KEY,
            source_type  TEXT NOT NULL,
            fact_count   INTEGER NOT NULL DEFAULT 0,
            extracted_at TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

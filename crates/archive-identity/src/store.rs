use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use archive_core::error::{ArchiveError, Result};

use crate::cache::IdentityCache;
use crate::db::init_db;
use crate::types::{
    AssetAssetEdge, AssetRole, ExtractionLogEntry, Fact, FactStatus, Person, PersonAssetLink,
    PersonIdentifiers, Relationship,
};

/// Per-person fact-write serialization (spec §4.3: "Never mutates across
/// concurrent writers without a per-person advisory lock"). The shared
/// connection mutex already serializes all SQL, but this makes the
/// invariant explicit and survives a future move to a connection pool.
#[derive(Default)]
struct AdvisoryLocks {
    locks: Mutex<std::collections::HashMap<i64, Arc<Mutex<()>>>>,
}

impl AdvisoryLocks {
    fn for_person(&self, person_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(person_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct IdentityStore {
    conn: Mutex<Connection>,
    cache: IdentityCache,
    fact_locks: AdvisoryLocks,
}

impl IdentityStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self::from_conn(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            cache: IdentityCache::new(),
            fact_locks: AdvisoryLocks::default(),
        }
    }

    /// Drop every in-process resolution cache (spec §4.3 `ClearCaches`).
    pub fn clear_caches(&self) {
        self.cache.clear_all();
    }

    // ---- identifier resolution -------------------------------------

    fn lookup_by_phone(conn: &Connection, phone: &str) -> Result<Option<i64>> {
        Ok(conn
            .query_row("SELECT id FROM persons WHERE phone = ?1", [phone], |r| {
                r.get(0)
            })
            .optional()?)
    }

    fn lookup_by_email(conn: &Connection, email: &str) -> Result<Option<i64>> {
        Ok(conn
            .query_row("SELECT id FROM persons WHERE email = ?1", [email], |r| {
                r.get(0)
            })
            .optional()?)
    }

    fn lookup_by_channel_id(conn: &Connection, channel_id: &str) -> Result<Option<i64>> {
        Ok(conn
            .query_row(
                "SELECT id FROM persons WHERE channel_id = ?1",
                [channel_id],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// Name-only match across `canonical_name` and `aliases`; ambiguous
    /// matches resolve to the most-recently-updated candidate (spec §4.3).
    fn lookup_by_name(conn: &Connection, name: &str) -> Result<Option<i64>> {
        let lowered = name.to_lowercase();
        let mut stmt = conn.prepare(
            "SELECT id, canonical_name, aliases FROM persons ORDER BY updated_at DESC",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let canonical: String = row.get(1)?;
            let aliases_json: String = row.get(2)?;
            if canonical.to_lowercase() == lowered {
                return Ok(Some(id));
            }
            let aliases: Vec<String> = serde_json::from_str(&aliases_json).unwrap_or_default();
            if aliases.iter().any(|a| a.to_lowercase() == lowered) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Resolve or create a person by the identifier cascade: phone → email
    /// → channel-id → alias/name exact match (spec §4.3). Identifier
    /// collisions across more than one matched candidate are merged into
    /// the earliest-created person, all-or-nothing (spec §9 "Identity
    /// merges are all-or-nothing within a single transaction").
    pub fn find_or_create_person(
        &self,
        name: &str,
        ids: &PersonIdentifiers,
    ) -> Result<i64> {
        let mut candidates: Vec<i64> = Vec::new();
        let mut push_candidate = |id: Option<i64>, candidates: &mut Vec<i64>| {
            if let Some(id) = id {
                if !candidates.contains(&id) {
                    candidates.push(id);
                }
            }
        };

        // Each identifier is checked independently (cache first, DB on
        // miss) so a call supplying several identifiers that each resolve
        // to a *different* existing person surfaces all of them — that's
        // the collision the merge step below resolves.
        let mut conn = self.conn.lock().unwrap();
        if let Some(phone) = &ids.phone {
            let id = match self.cache.get_phone(phone) {
                Some(id) => Some(id),
                None => Self::lookup_by_phone(&conn, phone)?,
            };
            push_candidate(id, &mut candidates);
        }
        if let Some(email) = &ids.email {
            let id = match self.cache.get_email(email) {
                Some(id) => Some(id),
                None => Self::lookup_by_email(&conn, email)?,
            };
            push_candidate(id, &mut candidates);
        }
        if let Some(wa) = &ids.whatsapp_id {
            let id = match self.cache.get_whatsapp_id(wa) {
                Some(id) => Some(id),
                None => Self::lookup_by_channel_id(&conn, wa)?,
            };
            push_candidate(id, &mut candidates);
        }
        if candidates.is_empty() {
            push_candidate(Self::lookup_by_name(&conn, name)?, &mut candidates);
        }

        let now = Utc::now().to_rfc3339();

        if candidates.is_empty() {
            let aliases = "[]";
            conn.execute(
                "INSERT INTO persons (canonical_name, aliases, phone, email, channel_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![name, aliases, ids.phone, ids.email, ids.whatsapp_id, now],
            )?;
            let id = conn.last_insert_rowid();
            drop(conn);
            self.populate_caches(id, name, ids);
            return Ok(id);
        }

        let primary = *candidates.iter().min().unwrap();
        for other in candidates.iter().filter(|&&c| c != primary) {
            Self::merge_persons_locked(&mut conn, primary, *other)?;
        }
        if candidates.len() > 1 {
            drop(conn);
            self.cache.clear_all();
            return self.attach_identifiers(primary, name, ids);
        }

        drop(conn);
        self.attach_identifiers(primary, name, ids)
    }

    /// Add any new alias/identifier learned from this call to the matched
    /// person, and refresh the caches.
    fn attach_identifiers(&self, person_id: i64, name: &str, ids: &PersonIdentifiers) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let (canonical, aliases_json, phone, email, channel_id): (
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = conn.query_row(
            "SELECT canonical_name, aliases, phone, email, channel_id FROM persons WHERE id = ?1",
            [person_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )?;
        let mut aliases: Vec<String> = serde_json::from_str(&aliases_json).unwrap_or_default();
        let name_known = canonical.to_lowercase() == name.to_lowercase()
            || aliases.iter().any(|a| a.to_lowercase() == name.to_lowercase());
        if !name_known {
            aliases.push(name.to_string());
        }
        let new_phone = phone.or_else(|| ids.phone.clone());
        let new_email = email.or_else(|| ids.email.clone());
        let new_channel_id = channel_id.or_else(|| ids.whatsapp_id.clone());
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE persons SET aliases = ?1, phone = ?2, email = ?3, channel_id = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                serde_json::to_string(&aliases).unwrap(),
                new_phone,
                new_email,
                new_channel_id,
                now,
                person_id
            ],
        )?;
        drop(conn);
        self.populate_caches(person_id, name, ids);
        Ok(person_id)
    }

    fn populate_caches(&self, person_id: i64, name: &str, ids: &PersonIdentifiers) {
        self.cache.put_name(name, person_id);
        if let Some(phone) = &ids.phone {
            self.cache.put_phone(phone, person_id);
        }
        if let Some(email) = &ids.email {
            self.cache.put_email(email, person_id);
        }
        if let Some(wa) = &ids.whatsapp_id {
            self.cache.put_whatsapp_id(wa, person_id);
        }
    }

    /// Absorb `other` into `primary`: move facts, relationships, and asset
    /// links, union aliases/identifiers, delete the `other` row. Conflicting
    /// unique rows (e.g. both already linked to the same asset/role) are
    /// dropped via `OR IGNORE` rather than erroring. Runs inside a single
    /// SQLite transaction, committed only once every statement below has
    /// succeeded, so a failure partway through (e.g. the `persons` DELETE)
    /// rolls back rather than leaving the graph half-merged (spec §7/§9:
    /// "Identity merges are all-or-nothing within a single transaction").
    fn merge_persons_locked(conn: &mut Connection, primary: i64, other: i64) -> Result<()> {
        let tx = conn.transaction()?;

        let (o_name, o_aliases, o_phone, o_email, o_channel): (
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = tx.query_row(
            "SELECT canonical_name, aliases, phone, email, channel_id FROM persons WHERE id = ?1",
            [other],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )?;
        let (p_aliases, p_phone, p_email, p_channel): (
            String,
            Option<String>,
            Option<String>,
            Option<String>,
        ) = tx.query_row(
            "SELECT aliases, phone, email, channel_id FROM persons WHERE id = ?1",
            [primary],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )?;

        let mut aliases: Vec<String> = serde_json::from_str(&p_aliases).unwrap_or_default();
        let other_aliases: Vec<String> = serde_json::from_str(&o_aliases).unwrap_or_default();
        for a in other_aliases.into_iter().chain(std::iter::once(o_name)) {
            if !aliases.iter().any(|x| x.eq_ignore_ascii_case(&a)) {
                aliases.push(a);
            }
        }

        tx.execute("UPDATE facts SET person_id = ?1 WHERE person_id = ?2", params![primary, other])?;
        tx.execute(
            "UPDATE OR IGNORE relationships SET person_a = ?1 WHERE person_a = ?2",
            params![primary, other],
        )?;
        tx.execute(
            "UPDATE OR IGNORE relationships SET person_b = ?1 WHERE person_b = ?2",
            params![primary, other],
        )?;
        tx.execute(
            "DELETE FROM relationships WHERE person_a = ?1 OR person_b = ?1",
            [other],
        )?;
        tx.execute(
            "UPDATE OR IGNORE person_assets SET person_id = ?1 WHERE person_id = ?2",
            params![primary, other],
        )?;
        tx.execute("DELETE FROM person_assets WHERE person_id = ?1", [other])?;
        tx.execute("DELETE FROM persons WHERE id = ?1", [other])?;

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE persons SET aliases = ?1, phone = ?2, email = ?3, channel_id = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                serde_json::to_string(&aliases).unwrap(),
                p_phone.or(o_phone),
                p_email.or(o_email),
                p_channel.or(o_channel),
                now,
                primary
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ---- facts --------------------------------------------------------

    /// Insert, supersede, or retire a fact (spec §4.3, P7). Serialized per
    /// `person_id` via the advisory lock.
    #[allow(clippy::too_many_arguments)]
    pub fn set_fact(
        &self,
        person_id: i64,
        key: &str,
        value: &str,
        confidence: f64,
        source_type: &str,
        source_ref: &str,
        source_quote: Option<&str>,
    ) -> Result<()> {
        let lock = self.fact_locks.for_person(person_id);
        let _guard = lock.lock().unwrap();
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let existing: Option<(i64, String, f64, String)> = conn
            .query_row(
                "SELECT id, value, confidence, first_seen FROM facts
                 WHERE person_id = ?1 AND key = ?2 AND status = 'active'",
                params![person_id, key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;

        let Some((existing_id, existing_value, existing_confidence, existing_first_seen)) = existing
        else {
            conn.execute(
                "INSERT INTO facts (person_id, key, value, confidence, source_type, source_ref, source_quote, first_seen, last_confirmed, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 'active')",
                params![person_id, key, value, confidence, source_type, source_ref, source_quote, now_str],
            )?;
            return Ok(());
        };

        if existing_value == value {
            let bumped = confidence.max(existing_confidence);
            conn.execute(
                "UPDATE facts SET confidence = ?1, last_confirmed = ?2 WHERE id = ?3",
                params![bumped, now_str, existing_id],
            )?;
            return Ok(());
        }

        if confidence > existing_confidence {
            conn.execute("UPDATE facts SET status = 'retired' WHERE id = ?1", [existing_id])?;
            conn.execute(
                "INSERT INTO facts (person_id, key, value, confidence, source_type, source_ref, source_quote, first_seen, last_confirmed, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 'active')",
                params![person_id, key, value, confidence, source_type, source_ref, source_quote, now_str],
            )?;
            return Ok(());
        }

        // Contradictory, lower-or-equal confidence: check whether this
        // exact contradicting value was already seen on a distinct day —
        // if so the two accumulated contradictions flip the active fact.
        let prior_seen_day: Option<String> = conn
            .query_row(
                "SELECT first_seen FROM facts WHERE person_id = ?1 AND key = ?2 AND value = ?3
                 ORDER BY first_seen DESC LIMIT 1",
                params![person_id, key, value],
                |r| r.get(0),
            )
            .optional()?;

        let existing_day = &existing_first_seen[..10.min(existing_first_seen.len())];
        let flips = match &prior_seen_day {
            Some(day) => &day[..10.min(day.len())] != existing_day,
            None => false,
        };

        if flips {
            conn.execute("UPDATE facts SET status = 'retired' WHERE id = ?1", [existing_id])?;
            conn.execute(
                "INSERT INTO facts (person_id, key, value, confidence, source_type, source_ref, source_quote, first_seen, last_confirmed, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 'active')",
                params![person_id, key, value, confidence, source_type, source_ref, source_quote, now_str],
            )?;
        } else {
            conn.execute(
                "INSERT INTO facts (person_id, key, value, confidence, source_type, source_ref, source_quote, first_seen, last_confirmed, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 'retired')",
                params![person_id, key, value, confidence, source_type, source_ref, source_quote, now_str],
            )?;
        }
        Ok(())
    }

    pub fn facts_for(&self, person_id: i64) -> Result<Vec<Fact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, person_id, key, value, confidence, source_type, source_ref, source_quote, first_seen, last_confirmed, status
             FROM facts WHERE person_id = ?1 AND status = 'active' ORDER BY key",
        )?;
        let rows = stmt
            .query_map([person_id], row_to_fact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- links ----------------------------------------------------------

    pub fn link_person_asset(
        &self,
        person_id: i64,
        asset_type: &str,
        asset_ref: &str,
        role: AssetRole,
        confidence: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO person_assets (person_id, asset_type, asset_ref, role, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![person_id, asset_type, asset_ref, role.to_string(), confidence],
        )?;
        Ok(())
    }

    pub fn link_assets(
        &self,
        src_asset_ref: &str,
        dst_asset_ref: &str,
        relation_type: &str,
        provenance: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO asset_asset_edges (src_asset_ref, dst_asset_ref, relation_type, provenance)
             VALUES (?1, ?2, ?3, ?4)",
            params![src_asset_ref, dst_asset_ref, relation_type, provenance],
        )?;
        Ok(())
    }

    /// Upsert a person↔person relationship (spec §3 "Relationship"). Unique
    /// on `(person_a, person_b, type)`; a repeat submission bumps confidence
    /// to the max seen rather than inserting a duplicate row.
    pub fn link_relationship(
        &self,
        person_a: i64,
        person_b: i64,
        relation_type: &str,
        confidence: f64,
        source_ref: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO relationships (person_a, person_b, relation_type, confidence, source_ref)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(person_a, person_b, relation_type)
             DO UPDATE SET confidence = MAX(confidence, excluded.confidence)",
            params![person_a, person_b, relation_type, confidence, source_ref],
        )?;
        Ok(())
    }

    // ---- reads ------------------------------------------------------------

    pub fn get_person(&self, id: i64) -> Result<Option<Person>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, canonical_name, aliases, phone, email, channel_id, created_at, updated_at
             FROM persons WHERE id = ?1",
            [id],
            row_to_person,
        )
        .optional()
        .map_err(ArchiveError::from)
    }

    pub fn assets_of(&self, person_id: i64, role: Option<AssetRole>) -> Result<Vec<PersonAssetLink>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, person_id, asset_type, asset_ref, role, confidence FROM person_assets
             WHERE person_id = ?1 AND (?2 IS NULL OR role = ?2)",
        )?;
        let role_str = role.map(|r| r.to_string());
        let rows = stmt
            .query_map(params![person_id, role_str], row_to_link)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// BFS over the relationship graph up to `depth` hops (spec §4.3
    /// `RelationshipsOf`).
    pub fn relationships_of(&self, person_id: i64, depth: u32) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().unwrap();
        let depth = depth.min(2);
        let mut visited: HashSet<i64> = HashSet::from([person_id]);
        let mut frontier: VecDeque<(i64, u32)> = VecDeque::from([(person_id, 0)]);
        let mut out = Vec::new();
        while let Some((current, d)) = frontier.pop_front() {
            if d >= depth {
                continue;
            }
            let mut stmt = conn.prepare(
                "SELECT id, person_a, person_b, relation_type, confidence, source_ref
                 FROM relationships WHERE person_a = ?1 OR person_b = ?1",
            )?;
            let rows = stmt
                .query_map([current], row_to_relationship)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for rel in rows {
                let other = if rel.person_a == current { rel.person_b } else { rel.person_a };
                out.push(rel);
                if visited.insert(other) {
                    frontier.push_back((other, d + 1));
                }
            }
        }
        Ok(out)
    }

    /// BFS over asset-asset edges up to `depth` hops, optionally restricted
    /// to a set of relation types (spec §4.3 `NeighborsOf`).
    pub fn neighbors_of(
        &self,
        asset_ref: &str,
        relation_filter: Option<&[&str]>,
        depth: u32,
    ) -> Result<Vec<AssetAssetEdge>> {
        let conn = self.conn.lock().unwrap();
        let depth = depth.min(2);
        let mut visited: HashSet<String> = HashSet::from([asset_ref.to_string()]);
        let mut frontier: VecDeque<(String, u32)> = VecDeque::from([(asset_ref.to_string(), 0)]);
        let mut out = Vec::new();
        while let Some((current, d)) = frontier.pop_front() {
            if d >= depth {
                continue;
            }
            let mut stmt = conn.prepare(
                "SELECT id, src_asset_ref, dst_asset_ref, relation_type, provenance
                 FROM asset_asset_edges WHERE src_asset_ref = ?1 OR dst_asset_ref = ?1",
            )?;
            let rows = stmt
                .query_map([&current], row_to_edge)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for edge in rows {
                if let Some(filter) = relation_filter {
                    if !filter.contains(&edge.relation_type.as_str()) {
                        continue;
                    }
                }
                let other = if edge.src_asset_ref == current {
                    edge.dst_asset_ref.clone()
                } else {
                    edge.src_asset_ref.clone()
                };
                out.push(edge);
                if visited.insert(other.clone()) {
                    frontier.push_back((other, d + 1));
                }
            }
        }
        Ok(out)
    }

    /// Name-only lookup, without creating a person on miss (spec §4.8 step
    /// 2 entity linking: a query mentioning an unknown name resolves to
    /// nothing rather than minting a new person record).
    pub fn find_by_name(&self, name: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        Self::lookup_by_name(&conn, name)
    }

    // ---- extraction dedup log ------------------------------------------

    pub fn was_extracted(&self, source_ref: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT 1 FROM extractions WHERE source_ref = ?1",
                [source_ref],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    pub fn record_extraction(&self, source_ref: &str, source_type: &str, fact_count: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let result = conn.execute(
            "INSERT OR REPLACE INTO extractions (source_ref, source_type, fact_count, extracted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![source_ref, source_type, fact_count, now],
        );
        if let Err(e) = result {
            warn!(error = %e, source_ref, "failed to record extraction dedup entry");
        }
        Ok(())
    }

    pub fn extraction_log(&self, source_ref: &str) -> Result<Option<ExtractionLogEntry>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT source_ref, source_type, fact_count, extracted_at FROM extractions WHERE source_ref = ?1",
            [source_ref],
            |r| {
                let extracted_at: String = r.get(3)?;
                Ok(ExtractionLogEntry {
                    source_ref: r.get(0)?,
                    source_type: r.get(1)?,
                    fact_count: r.get(2)?,
                    extracted_at: extracted_at
                        .parse()
                        .unwrap_or_else(|_| Utc::now()),
                })
            },
        )
        .optional()
        .map_err(ArchiveError::from)
    }
}

fn row_to_person(row: &rusqlite::Row) -> rusqlite::Result<Person> {
    let aliases_json: String = row.get(2)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;
    Ok(Person {
        id: row.get(0)?,
        canonical_name: row.get(1)?,
        aliases: serde_json::from_str(&aliases_json).unwrap_or_default(),
        phone: row.get(3)?,
        email: row.get(4)?,
        channel_id: row.get(5)?,
        created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: updated_at.parse().unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
    let first_seen: String = row.get(8)?;
    let last_confirmed: String = row.get(9)?;
    let status: String = row.get(10)?;
    Ok(Fact {
        id: row.get(0)?,
        person_id: row.get(1)?,
        key: row.get(2)?,
        value: row.get(3)?,
        confidence: row.get(4)?,
        source_type: row.get(5)?,
        source_ref: row.get(6)?,
        source_quote: row.get(7)?,
        first_seen: first_seen.parse().unwrap_or_else(|_| Utc::now()),
        last_confirmed: last_confirmed.parse().unwrap_or_else(|_| Utc::now()),
        status: status.parse().unwrap_or(FactStatus::Active),
    })
}

fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<PersonAssetLink> {
    let role: String = row.get(4)?;
    Ok(PersonAssetLink {
        id: row.get(0)?,
        person_id: row.get(1)?,
        asset_type: row.get(2)?,
        asset_ref: row.get(3)?,
        role: role.parse().unwrap_or(AssetRole::Mentioned),
        confidence: row.get(5)?,
    })
}

fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: row.get(0)?,
        person_a: row.get(1)?,
        person_b: row.get(2)?,
        relation_type: row.get(3)?,
        confidence: row.get(4)?,
        source_ref: row.get(5)?,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<AssetAssetEdge> {
    Ok(AssetAssetEdge {
        id: row.get(0)?,
        src_asset_ref: row.get(1)?,
        dst_asset_ref: row.get(2)?,
        relation_type: row.get(3)?,
        provenance: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_resolution_cascade_appends_alias() {
        let store = IdentityStore::open_in_memory().unwrap();
        let ids = PersonIdentifiers {
            phone: Some("+1-555".to_string()),
            ..Default::default()
        };
        let id1 = store.find_or_create_person("Alice", &ids).unwrap();
        let id2 = store.find_or_create_person("A.", &ids).unwrap();
        assert_eq!(id1, id2);
        let person = store.get_person(id1).unwrap().unwrap();
        assert!(person.aliases.iter().any(|a| a == "A."));
    }

    #[test]
    fn fact_supersession_by_confidence() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store
            .find_or_create_person("Bob", &PersonIdentifiers::default())
            .unwrap();
        store.set_fact(id, "city", "A", 0.6, "extraction", "msg-1", None).unwrap();
        store.set_fact(id, "city", "B", 0.9, "extraction", "msg-2", None).unwrap();
        let facts = store.facts_for(id).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "B");
    }

    #[test]
    fn lower_confidence_contradiction_does_not_supersede() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store
            .find_or_create_person("Carol", &PersonIdentifiers::default())
            .unwrap();
        store.set_fact(id, "city", "A", 0.9, "extraction", "msg-1", None).unwrap();
        store.set_fact(id, "city", "B", 0.3, "extraction", "msg-2", None).unwrap();
        let facts = store.facts_for(id).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "A");
    }

    #[test]
    fn duplicate_asset_link_is_ignored() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id = store
            .find_or_create_person("Dana", &PersonIdentifiers::default())
            .unwrap();
        store.link_person_asset(id, "whatsapp", "wa:123", AssetRole::Sender, 1.0).unwrap();
        store.link_person_asset(id, "whatsapp", "wa:123", AssetRole::Sender, 1.0).unwrap();
        let links = store.assets_of(id, None).unwrap();
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn identifier_collision_merges_persons() {
        let store = IdentityStore::open_in_memory().unwrap();
        let id1 = store
            .find_or_create_person(
                "Eve",
                &PersonIdentifiers {
                    phone: Some("+1-111".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        store.set_fact(id1, "city", "Tel Aviv", 0.8, "extraction", "msg-1", None).unwrap();
        let id2 = store
            .find_or_create_person(
                "Eve S.",
                &PersonIdentifiers {
                    email: Some("eve@example.com".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_ne!(id1, id2);

        // A later call supplies both identifiers at once; the cascade now
        // sees two distinct candidates and merges them.
        let merge_ids = PersonIdentifiers {
            phone: Some("+1-111".to_string()),
            email: Some("eve@example.com".to_string()),
            ..Default::default()
        };
        let merged = store.find_or_create_person("Eve", &merge_ids).unwrap();
        assert_eq!(merged, id1.min(id2));

        // The absorbed person's fact survived the merge.
        let facts = store.facts_for(merged).unwrap();
        assert!(facts.iter().any(|f| f.key == "city" && f.value == "Tel Aviv"));
    }
}

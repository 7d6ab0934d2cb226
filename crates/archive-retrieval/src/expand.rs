//! Gated graph expansion (spec §4.8 step 4): intent classification decides
//! *whether* to walk the identity graph at all before the (comparatively
//! expensive) vector search runs, rather than always expanding and
//! discarding — the same gating principle `query_intent.py`'s caller uses
//! to skip retrieval entirely for `PERSON_FACTS`.

use std::collections::HashSet;

use archive_identity::{Fact, FactStatus, IdentityStore};

use crate::intent::{should_expand_asset_neighborhood, should_expand_relationships, QueryIntent};

/// Asset-asset relations considered "neighborhood" for thread/attachment
/// expansion (spec §4.8 step 4, mirroring the edge relation set in §3).
const NEIGHBOR_RELATIONS: &[&str] = &[
    "thread_member",
    "attachment_of",
    "chunk_of",
    "reply_to",
    "references",
    "transcript_of",
];

/// Family relation types that widen the resolved-person set for
/// `FAMILY_CONTEXT` queries (spec §4.8 step 4).
const FAMILY_RELATIONS: &[&str] = &["spouse", "parent", "child", "sibling"];

#[derive(Debug, Default, Clone)]
pub struct ExpansionResult {
    /// `resolved_person_ids` plus any depth-1 family edges (only populated
    /// when `FAMILY_CONTEXT` fired).
    pub expanded_person_ids: Vec<i64>,
    /// Asset refs reachable from the resolved persons' own assets, up to
    /// depth 2 (only populated for `ASSET_*`/`CROSS_CHANNEL` intents).
    pub expanded_asset_refs: Vec<String>,
    /// Active facts pulled directly from C3 for `PERSON_FACTS` queries —
    /// injected into the prompt instead of driving a search expansion.
    pub injected_facts: Vec<Fact>,
}

pub fn expand(
    identity: &IdentityStore,
    intents: &HashSet<QueryIntent>,
    resolved_person_ids: &[i64],
) -> ExpansionResult {
    let mut result = ExpansionResult {
        expanded_person_ids: resolved_person_ids.to_vec(),
        ..Default::default()
    };

    if should_expand_relationships(intents) {
        for &pid in resolved_person_ids {
            let Ok(rels) = identity.relationships_of(pid, 1) else { continue };
            for rel in rels {
                if !FAMILY_RELATIONS.contains(&rel.relation_type.as_str()) {
                    continue;
                }
                let other = if rel.person_a == pid { rel.person_b } else { rel.person_a };
                if !result.expanded_person_ids.contains(&other) {
                    result.expanded_person_ids.push(other);
                }
            }
        }
    }

    if should_expand_asset_neighborhood(intents) {
        let mut seeds: Vec<String> = Vec::new();
        for &pid in resolved_person_ids {
            if let Ok(links) = identity.assets_of(pid, None) {
                for link in links {
                    if !seeds.contains(&link.asset_ref) {
                        seeds.push(link.asset_ref);
                    }
                }
            }
        }
        for seed in &seeds {
            if !result.expanded_asset_refs.contains(seed) {
                result.expanded_asset_refs.push(seed.clone());
            }
            let Ok(edges) = identity.neighbors_of(seed, Some(NEIGHBOR_RELATIONS), 2) else {
                continue;
            };
            for edge in edges {
                for asset_ref in [edge.src_asset_ref, edge.dst_asset_ref] {
                    if !result.expanded_asset_refs.contains(&asset_ref) {
                        result.expanded_asset_refs.push(asset_ref);
                    }
                }
            }
        }
    }

    if intents.contains(&QueryIntent::PersonFacts) {
        for &pid in resolved_person_ids {
            if let Ok(facts) = identity.facts_for(pid) {
                result
                    .injected_facts
                    .extend(facts.into_iter().filter(|f| f.status == FactStatus::Active));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_identity::PersonIdentifiers;

    fn ids() -> PersonIdentifiers {
        PersonIdentifiers { whatsapp_id: None, phone: None, email: None }
    }

    #[test]
    fn family_context_widens_person_set() {
        let identity = IdentityStore::open_in_memory().unwrap();
        let alice = identity.find_or_create_person("Alice", &ids()).unwrap();
        let bob = identity.find_or_create_person("Bob", &ids()).unwrap();
        identity.link_relationship(alice, bob, "spouse", 0.9, "test").unwrap();

        let intents = HashSet::from([QueryIntent::FamilyContext]);
        let result = expand(&identity, &intents, &[alice]);
        assert!(result.expanded_person_ids.contains(&bob));
    }

    #[test]
    fn person_facts_injects_active_facts_only() {
        let identity = IdentityStore::open_in_memory().unwrap();
        let alice = identity.find_or_create_person("Alice", &ids()).unwrap();
        identity.set_fact(alice, "city", "Tel Aviv", 0.6, "test", "r1", None).unwrap();
        identity.set_fact(alice, "city", "Haifa", 0.9, "test", "r2", None).unwrap();

        let intents = HashSet::from([QueryIntent::PersonFacts]);
        let result = expand(&identity, &intents, &[alice]);
        assert_eq!(result.injected_facts.len(), 1);
        assert_eq!(result.injected_facts[0].value, "Haifa");
    }

    #[test]
    fn general_intent_expands_nothing() {
        let identity = IdentityStore::open_in_memory().unwrap();
        let alice = identity.find_or_create_person("Alice", &ids()).unwrap();
        let intents = HashSet::from([QueryIntent::General]);
        let result = expand(&identity, &intents, &[alice]);
        assert_eq!(result.expanded_person_ids, vec![alice]);
        assert!(result.expanded_asset_refs.is_empty());
        assert!(result.injected_facts.is_empty());
    }
}

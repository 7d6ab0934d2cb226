//! Entity linking (spec §4.8 step 2): pull candidate person names out of
//! the condensed query and resolve each via the identity graph (C3). The
//! spec allows "NER, or simple noun-capture" — this is the latter: runs of
//! capitalized words are the candidate set, each is resolved independently
//! (a name with no match is simply dropped, not an error).

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use archive_identity::IdentityStore;

/// Matches runs of one or more capitalized words (`David`, `David Cohen`).
/// English-biased by construction — Hebrew has no case distinction to
/// anchor a noun-capture heuristic on, so Hebrew person mentions rely on
/// the caller already knowing the canonical name (e.g. via conversation
/// history) rather than blind extraction from the query text.
static CAPITALIZED_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*)*\b").expect("static pattern"));

/// Words that capitalize as the first word of a sentence but aren't names;
/// filtered out so a leading "What did..." doesn't get treated as a name.
const STOPWORDS: &[&str] = &[
    "What", "Who", "When", "Where", "Why", "How", "Did", "Does", "Is", "Are", "Tell", "Show",
    "Summarize", "The", "I", "My",
];

pub fn extract_candidate_names(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in CAPITALIZED_RUN.find_iter(query) {
        let candidate = m.as_str().trim();
        if candidate.split_whitespace().count() == 1 && STOPWORDS.contains(&candidate) {
            continue;
        }
        if seen.insert(candidate.to_string()) {
            out.push(candidate.to_string());
        }
    }
    out
}

/// Resolve each candidate name against the identity graph, collecting the
/// distinct set of person ids found. Unmatched names are dropped silently.
pub fn resolve_persons(identity: &IdentityStore, query: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    for name in extract_candidate_names(query) {
        if let Ok(Some(id)) = identity.find_by_name(&name) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_and_multi_word_names() {
        let names = extract_candidate_names("What did David Cohen say about Maria?");
        assert!(names.contains(&"David Cohen".to_string()));
        assert!(names.contains(&"Maria".to_string()));
    }

    #[test]
    fn drops_leading_question_word() {
        let names = extract_candidate_names("What did David say?");
        assert!(!names.contains(&"What".to_string()));
        assert!(names.contains(&"David".to_string()));
    }

    #[test]
    fn resolves_only_known_persons() {
        let identity = IdentityStore::open_in_memory().unwrap();
        let ids = archive_identity::PersonIdentifiers { whatsapp_id: None, phone: None, email: None };
        identity.find_or_create_person("David Cohen", &ids).unwrap();
        let resolved = resolve_persons(&identity, "What did David Cohen say about Zorblax?");
        assert_eq!(resolved.len(), 1);
    }
}

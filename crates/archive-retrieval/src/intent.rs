//! Rule-based query intent classification (spec §4.8 step 3), ported from
//! `original_source/src/query_intent.py`'s pattern sets. No LLM call —
//! keyword/regex matching only, so classification stays near-zero-latency.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryIntent {
    PersonFacts,
    PersonHistory,
    FamilyContext,
    AssetThread,
    AssetAttachment,
    CrossChannel,
    General,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("static intent pattern"))
        .collect()
}

static FAMILY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?:family|families|spouse|wife|husband|child|children|son|daughter|parent|mother|father|brother|sister|kid|kids)",
        r"(?:משפחה|בן זוג|אישה|בעל|ילד|ילדים|בן|בת|הורה|אמא|אבא|אח|אחות)",
        r"(?:'s\s+family|של\s+(?:ה)?משפחה)",
    ])
});

static FACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?:how old|age|birthday|birth date|born|where.*live|city|job|work|employer|id number|phone|email)",
        r"(?:בן כמה|בת כמה|גיל|יום הולדת|תאריך לידה|נולד|גר ב|עיר|עבודה|מספר תעודת|טלפון|מייל)",
    ])
});

static THREAD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?:thread|conversation|context|surrounding|before and after|full (?:chat|discussion|exchange))",
        r"(?:שרשור|שיחה|הקשר|מסביב|לפני ואחרי|כל ה(?:שיחה|דיון))",
    ])
});

static ATTACHMENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?:attachment|attached|file|document|pdf|contract|invoice|receipt)",
        r"(?:קובץ|מצורף|מסמך|חוזה|חשבונית|קבלה)",
    ])
});

static CROSS_CHANNEL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?:also.*(?:call|email|whatsapp|message)|(?:call|email|whatsapp|message).*too|across|both.*and)",
        r"(?:גם.*(?:שיחה|מייל|הודעה)|(?:שיחה|מייל|הודעה).*גם|בכל ה)",
    ])
});

static PERSON_QUERY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"(?:what did \w+ (?:say|tell|ask|write|send|mention))",
        r"(?:מה \w+ (?:אמר|שאל|כתב|שלח|ציין|סיפר))",
        r"(?:tell me about|show me.*from|everything about|summarize.*about)",
        r"(?:ספר לי על|תראה לי.*מ|הכל על|סכם.*על)",
    ])
});

fn matches_any(text: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Classify a (condensed) query into one or more intents. Never returns an
/// empty set — `General` is the fallback (spec §4.8 step 3).
pub fn classify_query_intent(query: &str, has_resolved_persons: bool) -> HashSet<QueryIntent> {
    let mut intents = HashSet::new();

    if matches_any(query, &FAMILY_PATTERNS) {
        intents.insert(QueryIntent::FamilyContext);
    }
    if matches_any(query, &FACT_PATTERNS) {
        intents.insert(QueryIntent::PersonFacts);
    }
    if matches_any(query, &THREAD_PATTERNS) {
        intents.insert(QueryIntent::AssetThread);
    }
    if matches_any(query, &ATTACHMENT_PATTERNS) {
        intents.insert(QueryIntent::AssetAttachment);
    }
    if matches_any(query, &CROSS_CHANNEL_PATTERNS) {
        intents.insert(QueryIntent::CrossChannel);
    }
    if has_resolved_persons && matches_any(query, &PERSON_QUERY_PATTERNS) {
        intents.insert(QueryIntent::PersonHistory);
    }
    if has_resolved_persons && intents.is_empty() {
        intents.insert(QueryIntent::PersonHistory);
    }
    if intents.is_empty() {
        intents.insert(QueryIntent::General);
    }
    intents
}

pub fn should_expand_relationships(intents: &HashSet<QueryIntent>) -> bool {
    intents.contains(&QueryIntent::FamilyContext)
}

pub fn should_expand_asset_neighborhood(intents: &HashSet<QueryIntent>) -> bool {
    intents.contains(&QueryIntent::AssetThread)
        || intents.contains(&QueryIntent::AssetAttachment)
        || intents.contains(&QueryIntent::CrossChannel)
}

/// Whether retrieval should be restricted to `resolved_person_ids` (spec
/// §4.8 step 5: "the intent filter adds `person_ids ∈ resolved_person_ids`
/// when `PERSON_HISTORY` or `FAMILY_CONTEXT` is set"). A `PERSON_FACTS`-only
/// query injects facts directly into the prompt instead (step 4) and must
/// not also narrow the vector search to that person.
pub fn should_filter_by_person(intents: &HashSet<QueryIntent>) -> bool {
    intents.contains(&QueryIntent::PersonHistory) || intents.contains(&QueryIntent::FamilyContext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_keyword_sets_family_context() {
        let intents = classify_query_intent("tell me about his wife", false);
        assert!(intents.contains(&QueryIntent::FamilyContext));
    }

    #[test]
    fn hebrew_fact_pattern_sets_person_facts() {
        let intents = classify_query_intent("בן כמה דוד", false);
        assert!(intents.contains(&QueryIntent::PersonFacts));
    }

    #[test]
    fn resolved_person_with_no_specific_intent_defaults_to_history() {
        let intents = classify_query_intent("what's up with the weather", true);
        assert_eq!(intents, HashSet::from([QueryIntent::PersonHistory]));
    }

    #[test]
    fn no_match_and_no_persons_falls_back_to_general() {
        let intents = classify_query_intent("what day is today?", false);
        assert_eq!(intents, HashSet::from([QueryIntent::General]));
    }

    #[test]
    fn multiple_intents_can_coexist() {
        let intents = classify_query_intent("what did David say about the attached contract?", true);
        assert!(intents.contains(&QueryIntent::PersonHistory));
        assert!(intents.contains(&QueryIntent::AssetAttachment));
    }

    #[test]
    fn expansion_gates_match_intent_sets() {
        let family = HashSet::from([QueryIntent::FamilyContext]);
        assert!(should_expand_relationships(&family));
        assert!(!should_expand_asset_neighborhood(&family));

        let thread = HashSet::from([QueryIntent::AssetThread]);
        assert!(should_expand_asset_neighborhood(&thread));
        assert!(!should_expand_relationships(&thread));
    }

    #[test]
    fn person_filter_gate_excludes_person_facts_only() {
        let facts = HashSet::from([QueryIntent::PersonFacts]);
        assert!(!should_filter_by_person(&facts));

        let history = HashSet::from([QueryIntent::PersonHistory]);
        assert!(should_filter_by_person(&history));

        let family = HashSet::from([QueryIntent::FamilyContext]);
        assert!(should_filter_by_person(&family));
    }
}

//! LLM-based identity/fact extraction (spec §4.3, §4.5 step 7, P8).
//!
//! Ported from `original_source/src/identity_extractor.py`'s `IdentityExtractor`
//! service — the "new" extractor spec §9's Open Questions names as
//! authoritative over the deprecated module-level `entity_extractor.py`
//! functions. Runs as a task body (spec §9 "break the cycle by making
//! identity extraction a task, not an in-line call"), never called inline
//! from the ingestion pipeline itself.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use archive_core::error::Result;
use archive_llm::{ChatRequest, LlmProvider, Message, Role};

use crate::store::IdentityStore;
use crate::types::PersonIdentifiers;

/// Where extracted content originated (spec §3's `source` tag, scoped to
/// the subset the extractor treats specially).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    Whatsapp,
    ChatCorrection,
    Paperless,
    Gmail,
    CallRecording,
    RagPipeline,
    Manual,
}

impl ExtractionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionSource::Whatsapp => "whatsapp",
            ExtractionSource::ChatCorrection => "chat_correction",
            ExtractionSource::Paperless => "paperless",
            ExtractionSource::Gmail => "gmail",
            ExtractionSource::CallRecording => "call_recording",
            ExtractionSource::RagPipeline => "rag_pipeline",
            ExtractionSource::Manual => "manual",
        }
    }

    /// Default confidence per source (spec §3 Fact `confidence`), mirroring
    /// `_SOURCE_CONFIDENCE` in the donor.
    fn default_confidence(self) -> f64 {
        match self {
            ExtractionSource::ChatCorrection | ExtractionSource::Manual => 0.8,
            _ => 0.6,
        }
    }

    /// Documents/emails/calls bypass the smart-content filter entirely
    /// (spec §4.5 step 7 "Documents and emails bypass the filter").
    fn always_extract(self) -> bool {
        matches!(
            self,
            ExtractionSource::Paperless | ExtractionSource::Gmail | ExtractionSource::CallRecording
        )
    }
}

const MIN_LENGTH: usize = 15;
const DOC_TRUNCATE_CHARS: usize = 4000;

static FACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"\d{1,2}[./\-]\d{1,2}[./\-]\d{2,4}").unwrap(),
        Regex::new(r"\b\d{5,}\b").unwrap(),
        Regex::new(r"@\w+\.\w+").unwrap(),
        Regex::new(r"(?u)בן\s*\d|בת\s*\d|גיל\s*\d").unwrap(),
        Regex::new(r"(?ui)נולד|birthday|born|birth").unwrap(),
        Regex::new(r"(?ui)גר\s+ב|living in|lives in|from\s+\w+").unwrap(),
        Regex::new(r"(?ui)עובד|עובדת|works at|working at|job").unwrap(),
        Regex::new(r"(?ui)נשוי|נשואה|married|divorced|גרוש|single").unwrap(),
        Regex::new(r"(?ui)אבא|אמא|אח\b|אחות|בן\b|בת\b|ילד|father|mother|brother|sister|son|daughter|child")
            .unwrap(),
    ]
});

static SKIP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Emoji block U+1F600-U+1F9FF, same range the donor's
        // `_SKIP_PATTERNS` uses for "pure emoji" content.
        Regex::new(r"^[\x{1F600}-\x{1F9FF}\s]+$").unwrap(),
        Regex::new(r"(?i)^\[sticker\]$").unwrap(),
        Regex::new(r"(?i)^\[image:").unwrap(),
    ]
});

/// Never emit "age" — only "birth_date" (spec P8, Fact key closed set is
/// open-ended but this one key is explicitly forbidden).
const FORBIDDEN_FACT_KEYS: &[&str] = &["age"];

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are a structured identity extraction system. Given a message or document, extract factual information about PEOPLE mentioned or implied.

RULES:
- Extract ONLY permanent, time-invariant facts, not temporary states or opinions.
- Never extract "age": it changes over time. Extract "birth_date" instead; age is computed on demand.
- Focus on birth dates, locations, jobs, phone numbers, email, ID numbers, family relationships, gender.
- Do not extract age, mood, recent_topic, temporary states, opinions, or emotions.
- If the sender is talking about themselves, the sender IS the entity.
- Return valid JSON only, no markdown and no explanation. If nothing extractable, return {"entities": []}.
- Use ISO format (YYYY-MM-DD) for dates where possible.
- Keep names in their original script.
- For each fact include a "quote" field with the exact short snippet that supports it.

RESPONSE FORMAT:
{"entities": [{"name": "Full Name", "facts": {"birth_date": {"value": "1994-03-15", "quote": "..."}}, "relationships": [{"related_to": "Other Name", "type": "spouse"}]}]}

Only include facts that are explicitly stated or very clearly implied. Do not guess."#;

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    entities: Vec<ExtractedEntity>,
}

#[derive(Debug, Deserialize)]
struct ExtractedEntity {
    name: String,
    #[serde(default)]
    facts: HashMap<String, FactValue>,
    #[serde(default)]
    relationships: Vec<ExtractedRelationship>,
}

#[derive(Debug, Deserialize)]
struct ExtractedRelationship {
    related_to: String,
    #[serde(rename = "type")]
    relation_type: String,
}

/// A fact value can arrive as a bare string or `{value, quote}` (donor
/// accepts both shapes; we mirror that tolerance here).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FactValue {
    Bare(String),
    WithQuote { value: String, #[serde(default)] quote: Option<String> },
}

impl FactValue {
    fn value(&self) -> &str {
        match self {
            FactValue::Bare(v) => v,
            FactValue::WithQuote { value, .. } => value,
        }
    }
    fn quote(&self) -> Option<&str> {
        match self {
            FactValue::Bare(_) => None,
            FactValue::WithQuote { quote, .. } => quote.as_deref(),
        }
    }
}

/// Content that is clearly too low-value to bother extracting from (pure
/// emoji, stickers, bare image placeholders).
fn is_skip_content(content: &str) -> bool {
    SKIP_PATTERNS.iter().any(|p| p.is_match(content.trim()))
}

/// Smart filter: documents always pass; everything else needs minimum
/// length plus at least one fact-shaped pattern (spec §4.5 step 7).
fn should_extract(content: &str, is_document: bool) -> bool {
    if is_skip_content(content) {
        return false;
    }
    if is_document {
        return content.trim().len() >= MIN_LENGTH;
    }
    if content.trim().chars().count() < MIN_LENGTH {
        return false;
    }
    FACT_PATTERNS.iter().any(|p| p.is_match(content))
}

fn build_user_prompt(content: &str, source: ExtractionSource, sender: &str, chat_name: &str) -> String {
    let truncated: String = if source.always_extract() && content.chars().count() > DOC_TRUNCATE_CHARS {
        content.chars().take(DOC_TRUNCATE_CHARS).collect()
    } else {
        content.to_string()
    };
    format!(
        "Source: {}\nSender: {}\nChat/Document: {}\n\nContent:\n{}",
        source.as_str(),
        sender,
        chat_name,
        truncated
    )
}

/// Parameters for one extraction submission (spec §4.5 step 7 / §9 "fire an
/// event; the extractor subscribes"). Constructed by the task body that
/// handles the `identity.extract` task enqueued during ingestion.
pub struct ExtractionRequest<'a> {
    pub content: &'a str,
    pub source: ExtractionSource,
    pub source_ref: &'a str,
    pub sender: &'a str,
    pub chat_name: &'a str,
    pub sender_whatsapp_id: Option<&'a str>,
    pub confidence: Option<f64>,
    pub model: &'a str,
}

/// Run one extraction submission end to end: dedup check, smart filter,
/// LLM call, storage, dedup-log write. Returns the number of facts stored
/// (0 if skipped/filtered/failed — never propagated as an ingestion error,
/// per spec §7 "anything on the ingestion path silently tolerates
/// non-critical sub-failures").
pub async fn submit(
    store: &IdentityStore,
    llm: &dyn LlmProvider,
    req: ExtractionRequest<'_>,
) -> Result<usize> {
    if store.was_extracted(req.source_ref)? {
        debug!(source_ref = req.source_ref, "identity extraction already done, skipping");
        return Ok(0);
    }

    if !should_extract(req.content, req.source.always_extract()) {
        return Ok(0);
    }

    let user_prompt = build_user_prompt(req.content, req.source, req.sender, req.chat_name);
    let chat = ChatRequest {
        model: req.model.to_string(),
        system: EXTRACTION_SYSTEM_PROMPT.to_string(),
        messages: vec![Message { role: Role::User, content: user_prompt }],
        max_tokens: 1024,
        stream: false,
    };

    let response = match llm.send(&chat).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(error = %e, source_ref = req.source_ref, "extraction LLM call failed, marking extracted with 0 facts");
            store.record_extraction(req.source_ref, req.source.as_str(), 0)?;
            return Ok(0);
        }
    };

    let parsed: ExtractionResponse = match serde_json::from_str(response.content.trim()) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, source_ref = req.source_ref, "extraction response was not valid JSON");
            store.record_extraction(req.source_ref, req.source.as_str(), 0)?;
            return Ok(0);
        }
    };

    let confidence = req.confidence.unwrap_or_else(|| req.source.default_confidence());
    let mut facts_stored = 0usize;
    let mut resolved: HashMap<String, i64> = HashMap::new();

    for entity in &parsed.entities {
        let identifiers = if entity.name.eq_ignore_ascii_case(req.sender) {
            PersonIdentifiers {
                whatsapp_id: req.sender_whatsapp_id.map(String::from),
                phone: None,
                email: None,
            }
        } else {
            PersonIdentifiers::default()
        };
        let person_id = store.find_or_create_person(&entity.name, &identifiers)?;
        resolved.insert(entity.name.clone(), person_id);

        for (key, fact_value) in &entity.facts {
            if FORBIDDEN_FACT_KEYS.contains(&key.as_str()) {
                warn!(key, "extractor attempted to emit a forbidden fact key, dropping");
                continue;
            }
            store.set_fact(
                person_id,
                key,
                fact_value.value(),
                confidence,
                req.source.as_str(),
                req.source_ref,
                fact_value.quote(),
            )?;
            facts_stored += 1;
        }
    }

    // Second pass for relationships: both ends must resolve to a person
    // (either extracted above, or an existing name match) before we link.
    for entity in &parsed.entities {
        let Some(&person_a) = resolved.get(&entity.name) else { continue };
        for rel in &entity.relationships {
            let person_b = match resolved.get(&rel.related_to) {
                Some(id) => *id,
                None => store.find_or_create_person(&rel.related_to, &PersonIdentifiers::default())?,
            };
            if person_a == person_b {
                continue;
            }
            store.link_relationship(person_a, person_b, &rel.relation_type, confidence, req.source_ref)?;
        }
    }

    store.record_extraction(req.source_ref, req.source.as_str(), facts_stored as i64)?;
    if facts_stored > 0 {
        info!(source_ref = req.source_ref, facts_stored, "identity extraction stored facts");
    }
    Ok(facts_stored)
}

/// Direct fact storage without any LLM call (spec §4.3 `SetFact`, exposed
/// here as the extractor's non-LLM entry point — manual edits via the
/// settings/admin surface, known structured data).
pub fn set_fact_direct(
    store: &IdentityStore,
    person_id: i64,
    key: &str,
    value: &str,
    confidence: f64,
    source_ref: Option<&str>,
) -> Result<()> {
    if FORBIDDEN_FACT_KEYS.contains(&key) {
        return Err(archive_core::error::ArchiveError::InvalidInput(format!(
            "fact key '{key}' is never stored (derive it on demand instead)"
        )));
    }
    store.set_fact(
        person_id,
        key,
        value,
        confidence,
        ExtractionSource::Manual.as_str(),
        source_ref.unwrap_or("manual"),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_extracts_age_pattern_as_fact_key() {
        assert!(FORBIDDEN_FACT_KEYS.contains(&"age"));
    }

    #[test]
    fn short_content_without_fact_pattern_is_filtered() {
        assert!(!should_extract("hey there", false));
    }

    #[test]
    fn birthday_mention_passes_filter() {
        assert!(should_extract("I'm turning 30 next week, born 15.03.1994", false));
    }

    #[test]
    fn hebrew_age_pattern_passes_filter() {
        assert!(should_extract("אני בן 30 ועובד בטכנולוגיה", false));
    }

    #[test]
    fn documents_bypass_pattern_filter() {
        assert!(should_extract("This is a long document with no obvious fact pattern at all here", true));
    }

    #[test]
    fn pure_emoji_is_skipped_even_for_documents() {
        assert!(!is_skip_content("hello") && is_skip_content("😀😀😀"));
    }
}

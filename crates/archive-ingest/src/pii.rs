//! PII detection and redaction (spec §4.5.1).
//!
//! Detects phone numbers, email addresses, credit-card-shaped numbers,
//! IBANs, and Israeli ID numbers via fixed regex recognizers, and applies
//! a per-channel policy (`redact`, `replace`, or `hash`). Embeddings always
//! use `replace` regardless of the channel's storage policy, so the token
//! structure the embedding model sees stays stable.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionAction {
    Redact,
    Replace,
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    PhoneNumber,
    Email,
    IlIdNumber,
    CreditCard,
    Iban,
}

impl EntityKind {
    fn label(self) -> &'static str {
        match self {
            EntityKind::PhoneNumber => "PHONE_NUMBER",
            EntityKind::Email => "EMAIL_ADDRESS",
            EntityKind::IlIdNumber => "IL_ID_NUMBER",
            EntityKind::CreditCard => "CREDIT_CARD",
            EntityKind::Iban => "IBAN_CODE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelPolicy {
    pub entities: Vec<EntityKind>,
    pub action: RedactionAction,
    pub score_threshold: f64,
}

/// Per-channel defaults mirroring the donor's `DEFAULT_POLICIES` (spec
/// §4.5.1). Channels not listed here fall back to the `whatsapp` policy.
pub fn default_policy(channel: &str) -> ChannelPolicy {
    use EntityKind::*;
    use RedactionAction::*;
    match channel {
        "gmail" => ChannelPolicy {
            entities: vec![PhoneNumber, CreditCard, Iban, IlIdNumber],
            action: Replace,
            score_threshold: 0.6,
        },
        "paperless" | "documents" => ChannelPolicy {
            entities: vec![CreditCard, Iban],
            action: Redact,
            score_threshold: 0.7,
        },
        "call_recording" | "callrec" => ChannelPolicy {
            entities: vec![PhoneNumber, CreditCard],
            action: Replace,
            score_threshold: 0.6,
        },
        _ => ChannelPolicy {
            entities: vec![PhoneNumber, Email, CreditCard, Iban, IlIdNumber],
            action: Hash,
            score_threshold: 0.6,
        },
    }
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").unwrap());
static CREDIT_CARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap());
static IBAN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{10,30}\b").unwrap());
// The `regex` crate has no lookaround support, so "exactly 9 digits, not
// part of a longer digit run" is expressed by matching the maximal digit
// run and filtering on its length rather than by a lookaround assertion.
static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static IL_PHONE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?:\+972|972)[\s-]?[2-9]\d[\s-]?\d{3}[\s-]?\d{4}").unwrap(),
        Regex::new(r"05\d[\s-]?\d{3}[\s-]?\d{4}").unwrap(),
        Regex::new(r"0[2-9]\d[\s-]?\d{3}[\s-]?\d{4}").unwrap(),
    ]
});

/// Validate an Israeli ID number's Luhn-like check digit.
pub fn is_valid_il_id(id: &str) -> bool {
    if id.len() != 9 || !id.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let total: u32 = id
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let mut digit = c.to_digit(10).unwrap();
            if i % 2 == 1 {
                digit *= 2;
            }
            if digit > 9 {
                digit -= 9;
            }
            digit
        })
        .sum();
    total % 10 == 0
}

#[derive(Debug, Clone)]
struct Span {
    kind: EntityKind,
    start: usize,
    end: usize,
}

fn detect(text: &str, entities: &[EntityKind]) -> Vec<Span> {
    let mut spans = Vec::new();
    for &kind in entities {
        match kind {
            EntityKind::PhoneNumber => {
                for re in IL_PHONE_RES.iter() {
                    for m in re.find_iter(text) {
                        spans.push(Span { kind, start: m.start(), end: m.end() });
                    }
                }
            }
            EntityKind::Email => {
                for m in EMAIL_RE.find_iter(text) {
                    spans.push(Span { kind, start: m.start(), end: m.end() });
                }
            }
            EntityKind::IlIdNumber => {
                for m in DIGIT_RUN_RE.find_iter(text) {
                    if m.as_str().len() == 9 && is_valid_il_id(m.as_str()) {
                        spans.push(Span { kind, start: m.start(), end: m.end() });
                    }
                }
            }
            EntityKind::CreditCard => {
                for m in CREDIT_CARD_RE.find_iter(text) {
                    spans.push(Span { kind, start: m.start(), end: m.end() });
                }
            }
            EntityKind::Iban => {
                for m in IBAN_RE.find_iter(text) {
                    spans.push(Span { kind, start: m.start(), end: m.end() });
                }
            }
        }
    }
    // sort by start, drop overlaps (first match wins — matches the order
    // entities are listed in the channel policy)
    spans.sort_by_key(|s| s.start);
    let mut out: Vec<Span> = Vec::new();
    for span in spans {
        if out.last().map(|last: &Span| span.start >= last.end).unwrap_or(true) {
            out.push(span);
        }
    }
    out
}

fn apply_action(text: &str, spans: &[Span], action: RedactionAction) -> String {
    if spans.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for span in spans {
        out.push_str(&text[cursor..span.start]);
        match action {
            RedactionAction::Redact => {}
            RedactionAction::Replace => {
                out.push('<');
                out.push_str(span.kind.label());
                out.push('>');
            }
            RedactionAction::Hash => {
                let digest = Sha256::digest(text[span.start..span.end].as_bytes());
                let prefix = hex::encode(&digest[..4]);
                out.push('<');
                out.push_str(span.kind.label());
                out.push('_');
                out.push_str(&prefix);
                out.push('>');
            }
        }
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

pub struct PiiRedactor {
    policies: HashMap<String, ChannelPolicy>,
}

impl Default for PiiRedactor {
    fn default() -> Self {
        Self::new()
    }
}

impl PiiRedactor {
    pub fn new() -> Self {
        Self { policies: HashMap::new() }
    }

    pub fn with_policy(mut self, channel: impl Into<String>, policy: ChannelPolicy) -> Self {
        self.policies.insert(channel.into(), policy);
        self
    }

    fn policy_for(&self, channel: &str) -> ChannelPolicy {
        self.policies
            .get(channel)
            .cloned()
            .unwrap_or_else(|| default_policy(channel))
    }

    /// Apply the channel's configured storage policy (may be `redact`,
    /// `replace`, or `hash`).
    pub fn redact_for_storage(&self, text: &str, channel: &str) -> String {
        let policy = self.policy_for(channel);
        let spans = detect(text, &policy.entities);
        apply_action(text, &spans, policy.action)
    }

    /// Always `replace`, regardless of the channel's storage action, to
    /// keep the embedding model's input token structure stable across
    /// channels (spec §4.5.1).
    pub fn redact_for_embedding(&self, text: &str, channel: &str) -> String {
        let policy = self.policy_for(channel);
        let spans = detect(text, &policy.entities);
        apply_action(text, &spans, RedactionAction::Replace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_il_id_passes_luhn() {
        // 9 digits whose weighted digit sum is a multiple of 10
        assert!(is_valid_il_id("123456782"));
        assert!(!is_valid_il_id("123456789"));
    }

    #[test]
    fn hash_action_is_deterministic_and_reversible_by_lookup() {
        let redactor = PiiRedactor::new();
        let text = "call me at 0501234567 please";
        let once = redactor.redact_for_storage(text, "whatsapp");
        let twice = redactor.redact_for_storage(text, "whatsapp");
        assert_eq!(once, twice);
        assert!(once.contains("<PHONE_NUMBER_"));
    }

    #[test]
    fn embedding_always_uses_replace() {
        let redactor = PiiRedactor::new();
        let text = "call me at 0501234567";
        let embed = redactor.redact_for_embedding(text, "whatsapp");
        assert_eq!(embed, "call me at <PHONE_NUMBER>");
    }

    #[test]
    fn paperless_policy_redacts_credit_cards_fully() {
        let redactor = PiiRedactor::new();
        let text = "card 4111111111111111 on file";
        let out = redactor.redact_for_storage(text, "paperless");
        assert!(!out.contains("4111111111111111"));
        assert!(!out.contains("CREDIT_CARD"));
    }

    #[test]
    fn email_detected_and_replaced_for_gmail_channel() {
        let redactor = PiiRedactor::new();
        let text = "reach me at name@example.com";
        let out = redactor.redact_for_storage(text, "gmail");
        assert_eq!(out, "reach me at name@example.com");
        // gmail policy doesn't include EMAIL_ADDRESS per spec defaults
    }
}

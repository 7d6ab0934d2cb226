use once_cell::sync::Lazy;
use regex::Regex;

/// BM25 constants (spec §4.4). `AVG_DOC_LEN` is a hard-coded estimate, not
/// tuned against the real corpus length distribution (spec Open Questions).
const K1: f32 = 1.2;
const B: f32 = 0.75;
const AVG_DOC_LEN: f32 = 100.0;

static FORMAT_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Cf}").unwrap());
static TOKEN_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

fn is_hebrew_token(token: &str) -> bool {
    token.chars().all(|c| {
        let cp = c as u32;
        (0x0590..=0x05FF).contains(&cp)
    })
}

/// Tokenize text the same way at ingest and query time: strip invisible
/// formatting characters (Unicode category `Cf`), split on script-aware
/// word boundaries, and drop tokens shorter than the per-script minimum
/// (3 for Latin/other scripts, 2 for Hebrew — spec §4.4).
pub fn tokenize(text: &str) -> Vec<String> {
    let stripped = FORMAT_CHARS.replace_all(text, "");
    let lowered = stripped.to_lowercase();
    TOKEN_BOUNDARY
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .filter(|tok| {
            let min_len = if is_hebrew_token(tok) { 2 } else { 3 };
            tok.chars().count() >= min_len
        })
        .collect()
}

/// Hash a token to a uint32 vector index via CRC32 (spec §4.4). The
/// tokenizer and this hash must stay byte-identical between ingest and
/// query paths — never change either without re-indexing the collection.
pub fn token_index(token: &str) -> u32 {
    crc32fast::hash(token.as_bytes())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// Compute the document-side sparse vector: BM25 term weights over the
/// chunk's own token frequencies (spec §4.4). No corpus-wide IDF term is
/// available at ingest time, so this is a per-document BM25 weighting —
/// consistent with the ingest pipeline running on one chunk at a time.
pub fn document_vector(text: &str) -> SparseVector {
    let tokens = tokenize(text);
    let doc_len = tokens.len() as f32;
    let mut counts: std::collections::HashMap<u32, u32> = std::collections::HashMap::new();
    for tok in &tokens {
        *counts.entry(token_index(tok)).or_insert(0) += 1;
    }
    let mut indices: Vec<u32> = counts.keys().copied().collect();
    indices.sort_unstable();
    let values = indices
        .iter()
        .map(|idx| {
            let tf = counts[idx] as f32;
            let norm = 1.0 - B + B * (doc_len / AVG_DOC_LEN);
            tf * (K1 + 1.0) / (tf + K1 * norm)
        })
        .collect();
    SparseVector { indices, values }
}

/// Compute the query-side sparse vector: every unique term gets weight 1.0
/// — no TF saturation, since a query has no meaningful term frequency
/// signal of its own (spec §4.4).
pub fn query_vector(text: &str) -> SparseVector {
    let tokens = tokenize(text);
    let mut indices: Vec<u32> = tokens.iter().map(|t| token_index(t)).collect();
    indices.sort_unstable();
    indices.dedup();
    let values = vec![1.0; indices.len()];
    SparseVector { indices, values }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_short_latin_tokens() {
        let toks = tokenize("a an the cat sat");
        assert_eq!(toks, vec!["the".to_string(), "cat".to_string(), "sat".to_string()]);
    }

    #[test]
    fn keeps_two_letter_hebrew_tokens() {
        let toks = tokenize("של אני");
        assert_eq!(toks, vec!["של".to_string(), "אני".to_string()]);
    }

    #[test]
    fn tokenizer_is_deterministic() {
        let text = "The Quick Brown Fox";
        assert_eq!(tokenize(text), tokenize(text));
    }

    #[test]
    fn document_vector_indices_are_sorted_and_deduped() {
        let v = document_vector("alpha alpha beta gamma");
        let mut sorted = v.indices.clone();
        sorted.sort_unstable();
        assert_eq!(v.indices, sorted);
        let unique: std::collections::HashSet<_> = v.indices.iter().collect();
        assert_eq!(unique.len(), v.indices.len());
    }

    #[test]
    fn query_vector_uses_unit_weight() {
        let v = query_vector("alpha alpha beta");
        assert!(v.values.iter().all(|w| (*w - 1.0).abs() < f32::EPSILON));
    }
}

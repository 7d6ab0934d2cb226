//! Text sanitization, chunking, and quality filtering (spec §4.5 step 3).

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum characters per chunk. Hebrew tokenizes at roughly 1.5 tokens per
/// character versus ~0.25 for English, so this is sized for the worst-case
/// multilingual text under an 8,191-token embedding context window.
pub const MAX_CHUNK_CHARS: usize = 4_500;
pub const CHUNK_OVERLAP_CHARS: usize = 200;
pub const MIN_WORD_CHAR_RATIO: f64 = 0.40;
pub const MIN_CHUNK_LENGTH: usize = 20;

static WORD_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\w\s.,;:!?'"-]"#).unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Strip Unicode category `Cf` (format) characters: RTL/LTR marks,
/// zero-width joiners, directional overrides, BOM, soft hyphens.
pub fn strip_unicode_control(text: &str) -> String {
    text.chars()
        .filter(|c| !is_format_char(*c))
        .collect()
}

fn is_format_char(c: char) -> bool {
    // `char` has no built-in Unicode category lookup in std; the set of
    // category-Cf code points we actually see in ingested text is small and
    // fixed, so it is enumerated directly rather than pulling in a full
    // Unicode-properties crate for one predicate.
    matches!(
        c as u32,
        0x00AD
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
    )
}

/// Remove HTML tags and return plain text. A regex-based strip is
/// sufficient here — ingestion only needs the text content, not a faithful
/// DOM, and the source documents (email bodies, scanned-doc exports) are
/// not adversarial input.
pub fn strip_html(html: &str) -> String {
    TAG.replace_all(html, " ").to_string()
}

/// Split text into chunks that fit within `max_chars`. Tries a paragraph
/// boundary first, then a sentence boundary, then falls back to a hard
/// character split. Overlap is applied only on hard splits — paragraph and
/// sentence splits already land on natural boundaries and re-including the
/// tail of the previous chunk there would just duplicate clean text for no
/// benefit.
pub fn split_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let end = (start + max_chars).min(len);
        if end >= len {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let window: String = chars[start..end].iter().collect();
        let (boundary, hard_split) = match window.rfind("\n\n") {
            Some(b) if b > 0 => (start + window[..b].chars().count() + 2, false),
            _ => match window.rfind(". ") {
                Some(b) if b > 0 => (start + window[..b].chars().count() + 2, false),
                _ => (end, true),
            },
        };

        chunks.push(chars[start..boundary].iter().collect());
        start = if hard_split {
            // overlap only applies to hard splits; paragraph/sentence
            // boundaries are natural seams and don't need re-including.
            let next = boundary.saturating_sub(overlap);
            if next > start { next } else { boundary }
        } else {
            boundary
        };
    }

    chunks
}

/// Reject chunks whose ratio of word-like characters drops below
/// `min_word_char_ratio` — base64/binary residue — or whose stripped length
/// is below `min_length`.
pub fn is_quality_chunk(chunk: &str, min_word_char_ratio: f64, min_length: usize) -> bool {
    let stripped = chunk.trim();
    if stripped.chars().count() < min_length {
        return false;
    }
    let total = stripped.chars().count();
    let word_chars = WORD_LIKE.find_iter(stripped).count();
    let ratio = if total == 0 { 0.0 } else { word_chars as f64 / total as f64 };
    ratio >= min_word_char_ratio
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_text("hello world", MAX_CHUNK_CHARS, CHUNK_OVERLAP_CHARS);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn paragraph_boundary_preferred_no_overlap() {
        let para_a = "a".repeat(100);
        let para_b = "b".repeat(100);
        let text = format!("{para_a}\n\n{para_b}");
        let chunks = split_text(&text, 150, 20);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with("\n\n"));
        assert!(!chunks[1].starts_with('a'));
    }

    #[test]
    fn hard_split_applies_overlap() {
        let text = "x".repeat(1000);
        let chunks = split_text(&text, 400, 50);
        assert!(chunks.len() >= 3);
        // the tail of chunk N and head of chunk N+1 share `overlap` chars
        let tail = &chunks[0][chunks[0].len() - 50..];
        assert!(chunks[1].starts_with(tail));
    }

    #[test]
    fn rejects_low_word_char_ratio() {
        let base64ish = "aGVsbG8gd29ybGQsIHRoaXMgaXMgYmFzZTY0==+++///===";
        assert!(!is_quality_chunk(base64ish, MIN_WORD_CHAR_RATIO, MIN_CHUNK_LENGTH));
    }

    #[test]
    fn accepts_normal_prose() {
        let prose = "The deadline for the quarterly report is February 16, 2026.";
        assert!(is_quality_chunk(prose, MIN_WORD_CHAR_RATIO, MIN_CHUNK_LENGTH));
    }

    #[test]
    fn rejects_too_short() {
        assert!(!is_quality_chunk("hi", MIN_WORD_CHAR_RATIO, MIN_CHUNK_LENGTH));
    }

    #[test]
    fn strips_format_characters() {
        let with_marks = "hello\u{200B}\u{200E}world";
        assert_eq!(strip_unicode_control(with_marks), "helloworld");
    }

    #[test]
    fn strips_html_tags() {
        assert_eq!(strip_html("<p>hello <b>world</b></p>"), " hello  world  ");
    }
}

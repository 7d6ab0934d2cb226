//! Synthesis prompt assembly (spec §4.8 step 7), grounded on the system
//! prompt built inline in `original_source/src/rag.py`'s `query()` method:
//! a timezone-aware "current time" anchor, retrieved chunks formatted as
//! numbered, attributed context blocks, any facts injected by graph
//! expansion, and an explicit citation instruction.

use chrono_tz::Tz;

use archive_identity::Fact;
use archive_vectorstore::ScoredChunk;

const SYSTEM_PREAMBLE: &str = "You are a personal archive assistant. Answer the user's question using \
ONLY the context below — retrieved messages, documents, and facts from their personal archive. If the \
context does not contain the answer, say so plainly instead of guessing. When you reference something \
from the context, cite it inline using its [N] marker. Preserve the language the user asked in.";

const EVENT_INSTRUCTION: &str = "If the user is asking you to schedule or remember an event with a \
clear date and time, append a block in exactly this form at the end of your answer:\n\
[CREATE_EVENT]\ntitle: <title>\nstart: <YYYY-MM-DDTHH:MM>\nend: <YYYY-MM-DDTHH:MM>\n\
location: <optional>\ndescription: <optional>\n[/CREATE_EVENT]";

pub struct PromptContext<'a> {
    pub now_tz: Tz,
    pub chunks: &'a [ScoredChunk],
    pub injected_facts: &'a [Fact],
    pub person_names: &'a [String],
}

/// Builds the system prompt handed to the chat model for final synthesis.
/// The numbered context blocks this emits line up 1:1 with `SourceRef`s the
/// engine returns, so `[N]` citations in the answer are resolvable.
pub fn build_system_prompt(ctx: &PromptContext) -> String {
    let now = chrono::Utc::now().with_timezone(&ctx.now_tz);
    let mut sections = vec![
        SYSTEM_PREAMBLE.to_string(),
        format!("Current date and time: {}", now.format("%A, %-d %B %Y %H:%M %Z")),
        EVENT_INSTRUCTION.to_string(),
    ];

    if !ctx.injected_facts.is_empty() {
        let mut facts = String::from("Known facts about the people involved:\n");
        for fact in ctx.injected_facts {
            facts.push_str(&format!("- {}: {} (confidence {:.2})\n", fact.key, fact.value, fact.confidence));
        }
        sections.push(facts.trim_end().to_string());
    }

    if !ctx.person_names.is_empty() {
        sections.push(format!("People resolved from the question: {}", ctx.person_names.join(", ")));
    }

    if ctx.chunks.is_empty() {
        sections.push("Context: (no matching archive entries were found)".to_string());
    } else {
        let mut context = String::from("Context:\n");
        for (i, chunk) in ctx.chunks.iter().enumerate() {
            context.push_str(&format_context_block(i + 1, chunk, &ctx.now_tz));
        }
        sections.push(context.trim_end().to_string());
    }

    sections.join("\n\n")
}

fn format_context_block(index: usize, chunk: &ScoredChunk, tz: &Tz) -> String {
    let payload = &chunk.payload;
    let dt = chrono::DateTime::from_timestamp(payload.timestamp, 0)
        .unwrap_or_default()
        .with_timezone(tz);
    let sender = payload.sender.as_deref().unwrap_or("Unknown");
    let chat = payload.chat_name.as_deref().unwrap_or(&payload.source);
    format!(
        "[{index}] ({} in {chat} on {}): {}\n",
        sender,
        dt.format("%-d/%-m/%Y %H:%M"),
        payload.text.trim(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_vectorstore::{ChunkPayload, ContentType};

    fn chunk() -> ScoredChunk {
        ScoredChunk {
            point_id: 1,
            score: 0.9,
            payload: ChunkPayload {
                source_id: "s:1".into(),
                source: "whatsapp".into(),
                content_type: ContentType::Text,
                text: "lunch at noon".into(),
                sender: Some("Alice".into()),
                chat_id: None,
                chat_name: Some("Family".into()),
                is_group: true,
                timestamp: 1700000000,
                language: None,
                has_media: false,
                media_type: None,
                media_url: None,
                media_path: None,
                chunk_index: None,
                chunk_total: None,
                asset_id: "whatsapp:1".into(),
                parent_asset_id: None,
                thread_id: None,
                chunk_group_id: None,
                person_ids: vec![],
                mentioned_person_ids: vec![],
            },
        }
    }

    #[test]
    fn includes_numbered_context_and_citation_instruction() {
        let chunks = vec![chunk()];
        let ctx = PromptContext {
            now_tz: chrono_tz::UTC,
            chunks: &chunks,
            injected_facts: &[],
            person_names: &[],
        };
        let prompt = build_system_prompt(&ctx);
        assert!(prompt.contains("[1] (Alice in Family"));
        assert!(prompt.contains("cite it inline"));
    }

    #[test]
    fn empty_context_says_so_explicitly() {
        let ctx = PromptContext {
            now_tz: chrono_tz::UTC,
            chunks: &[],
            injected_facts: &[],
            person_names: &[],
        };
        let prompt = build_system_prompt(&ctx);
        assert!(prompt.contains("no matching archive entries"));
    }
}

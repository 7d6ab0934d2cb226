//! The seven-step ingestion pipeline (spec §4.5): dedup check, PII
//! redaction, chunking, asset-graph derivation, embedding, upsert, and
//! identity-extraction dispatch.

use std::sync::Arc;

use tracing::{debug, info, warn};

use archive_core::error::{ArchiveError, Result};
use archive_identity::{AssetRole, IdentityStore, PersonIdentifiers};
use archive_llm::{EmbedRequest, Embedder};
use archive_tasks::{QueueName, TaskEnvelope, TaskQueue};
use archive_vectorstore::{generate_asset_id, ChunkPayload, ContentType, VectorStore};

use crate::chunk::{is_quality_chunk, split_text, strip_html, strip_unicode_control, CHUNK_OVERLAP_CHARS, MAX_CHUNK_CHARS, MIN_CHUNK_LENGTH, MIN_WORD_CHAR_RATIO};
use crate::pii::PiiRedactor;
use crate::types::{IngestOutcome, MediaInfo, SourceItem};

/// Everything [`ingest`] needs, gathered so the gateway binary wires it once
/// per process rather than threading five arguments through every call.
pub struct IngestDeps {
    pub identity: Arc<IdentityStore>,
    pub vectorstore: Arc<VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub tasks: Arc<TaskQueue>,
    pub pii: PiiRedactor,
    pub embed_model: String,
}

/// Content-type inference from the item's declared media kind (spec §3
/// "Content chunk" `content_type`). Falls back to `call_recording` for the
/// call-recording channel even without an attached media blob (a
/// transcript-only item), and to plain text otherwise.
fn infer_content_type(item: &SourceItem) -> ContentType {
    if let Some(media) = &item.media {
        return match media.media_type.as_str() {
            "image" => ContentType::Image,
            "voice" | "audio" => ContentType::Voice,
            "document" => ContentType::Document,
            "call_recording" => ContentType::CallRecording,
            _ => ContentType::Text,
        };
    }
    if item.source == "call_recording" || item.source == "callrec" {
        return ContentType::CallRecording;
    }
    ContentType::Text
}

fn extraction_source_for(source: &str) -> archive_identity::ExtractionSource {
    use archive_identity::ExtractionSource::*;
    match source {
        "whatsapp" => Whatsapp,
        "gmail" => Gmail,
        "paperless" | "documents" => Paperless,
        "call_recording" | "callrec" => CallRecording,
        "chat_correction" => ChatCorrection,
        _ => RagPipeline,
    }
}

fn media_fields(media: &Option<MediaInfo>) -> (bool, Option<String>, Option<String>, Option<String>) {
    match media {
        Some(m) => (true, Some(m.media_type.clone()), m.media_url.clone(), m.media_path.clone()),
        None => (false, None, None, None),
    }
}

/// Step 1: has this raw item already been ingested? Dedup is keyed on the
/// first chunk's point id since that is the only id stable across a retried
/// ingestion of the same source item (spec §4.5 step 1, §4.4 `Upsert`
/// idempotency via `point_id_for`).
async fn already_ingested(store: &VectorStore, first_chunk_source_id: &str) -> Result<bool> {
    store.exists_source_id(first_chunk_source_id).await
}

/// Run one [`SourceItem`] through the full pipeline. Non-critical
/// sub-failures (graph-edge writes, extraction dispatch) are logged and
/// swallowed rather than propagated — spec §7 "anything on the ingestion
/// path silently tolerates non-critical sub-failures" — but dedup, storage
/// redaction, embedding, and upsert failures are not: those are the
/// correctness-critical steps and are returned as `Err`.
pub async fn ingest(deps: &IngestDeps, item: SourceItem) -> Result<IngestOutcome> {
    let base_id = item.base_source_id();
    let asset_id = generate_asset_id(&item.source, &item.source_native_id);

    let preview_source_id = format!("{base_id}#0");
    if already_ingested(&deps.vectorstore, &preview_source_id).await?
        || already_ingested(&deps.vectorstore, &base_id).await?
    {
        debug!(source_id = %base_id, "item already ingested, skipping");
        return Ok(IngestOutcome {
            chunks_written: 0,
            skipped_duplicate: true,
            extraction_dispatched: false,
        });
    }

    // Step 2: PII redaction. Storage text keeps the channel's configured
    // policy; the embedding-time text always uses `replace` so the
    // embedding model sees a stable token shape across channels.
    let cleaned = strip_unicode_control(&strip_html(&item.text));
    let storage_text = deps.pii.redact_for_storage(&cleaned, &item.source);
    let embed_text = deps.pii.redact_for_embedding(&cleaned, &item.source);

    // Step 3: chunk + quality filter. Chunking runs on the storage text;
    // the parallel embedding text is split with the same boundaries so
    // indices line up, then each side is independently quality-filtered
    // against its own content.
    let storage_chunks = split_text(&storage_text, MAX_CHUNK_CHARS, CHUNK_OVERLAP_CHARS);
    let embed_chunks = split_text(&embed_text, MAX_CHUNK_CHARS, CHUNK_OVERLAP_CHARS);
    let pairs: Vec<(String, String)> = storage_chunks
        .into_iter()
        .zip(embed_chunks)
        .filter(|(stored, _)| is_quality_chunk(stored, MIN_WORD_CHAR_RATIO, MIN_CHUNK_LENGTH))
        .collect();

    // Step 4/5: asset-graph derivation. The sender resolves (or is created)
    // once per item and is linked to the asset as its sender; reply and
    // thread edges connect this asset to the ones it's structurally part
    // of. These are graph side effects only — failures here must never
    // block the chunks themselves from being written.
    let mut person_ids = Vec::new();
    if let Some(sender) = &item.sender {
        let identifiers = PersonIdentifiers {
            whatsapp_id: item.sender_whatsapp_id.clone(),
            phone: None,
            email: None,
        };
        match deps.identity.find_or_create_person(sender, &identifiers) {
            Ok(person_id) => {
                person_ids.push(person_id);
                if let Err(e) =
                    deps.identity
                        .link_person_asset(person_id, &item.source, &asset_id, AssetRole::Sender, 1.0)
                {
                    warn!(error = %e, asset_id = %asset_id, "failed to link sender to asset");
                }
            }
            Err(e) => warn!(error = %e, sender = %sender, "failed to resolve sender identity"),
        }
    }

    if let Some(parent_native_id) = &item.parent_native_id {
        let parent_asset_id = generate_asset_id(&item.source, parent_native_id);
        if let Err(e) = deps.identity.link_assets(&asset_id, &parent_asset_id, "reply_to", &item.source) {
            warn!(error = %e, asset_id = %asset_id, "failed to link reply_to edge");
        }
    }
    if let Some(thread_id) = &item.thread_id {
        let thread_asset_id = format!("thread:{thread_id}");
        if let Err(e) = deps.identity.link_assets(&asset_id, &thread_asset_id, "thread_member", &item.source) {
            warn!(error = %e, asset_id = %asset_id, "failed to link thread_member edge");
        }
    }

    // Steps 6/7: embed + sparse-vectorize + upsert. Nothing to write if
    // every chunk was filtered out as low quality.
    let content_type = infer_content_type(&item);
    let (has_media, media_type, media_url, media_path) = media_fields(&item.media);
    let chunk_total = pairs.len();

    let mut chunks_written = 0usize;
    if chunk_total > 0 {
        let embed_inputs: Vec<String> = pairs.iter().map(|(_, e)| e.clone()).collect();
        let embedded = deps
            .embedder
            .embed(&EmbedRequest { model: deps.embed_model.clone(), inputs: embed_inputs })
            .await
            .map_err(|e| ArchiveError::from(&e))?;

        if embedded.vectors.len() != chunk_total {
            return Err(ArchiveError::Internal(format!(
                "embedder returned {} vectors for {chunk_total} chunks",
                embedded.vectors.len()
            )));
        }

        for (idx, ((stored_text, _), dense)) in pairs.iter().zip(embedded.vectors.into_iter()).enumerate() {
            let source_id = if chunk_total > 1 {
                format!("{base_id}#{idx}")
            } else {
                base_id.clone()
            };
            let sparse = archive_vectorstore::sparse::document_vector(stored_text);
            let payload = ChunkPayload {
                source_id,
                source: item.source.clone(),
                content_type: content_type.clone(),
                text: stored_text.clone(),
                sender: item.sender.clone(),
                chat_id: item.chat_id.clone(),
                chat_name: item.chat_name.clone(),
                is_group: item.is_group,
                timestamp: item.timestamp,
                language: None,
                has_media,
                media_type: media_type.clone(),
                media_url: media_url.clone(),
                media_path: media_path.clone(),
                chunk_index: if chunk_total > 1 { Some(idx as u32) } else { None },
                chunk_total: if chunk_total > 1 { Some(chunk_total as u32) } else { None },
                asset_id: asset_id.clone(),
                parent_asset_id: item
                    .parent_native_id
                    .as_ref()
                    .map(|p| generate_asset_id(&item.source, p)),
                thread_id: item.thread_id.clone(),
                chunk_group_id: if chunk_total > 1 { Some(base_id.clone()) } else { None },
                person_ids: person_ids.clone(),
                mentioned_person_ids: Vec::new(),
            };
            deps.vectorstore.upsert(dense, sparse, payload).await?;
            chunks_written += 1;
        }
    }

    // Step 8 (spec §4.5 step 7): dispatch identity extraction as a task
    // rather than calling the LLM inline — `submit` re-checks both the
    // dedup log and the smart-content filter itself, so the pipeline does
    // not need to duplicate that gating here; it only decides *whether a
    // sender identity is known* to carry through to the task body.
    let extraction_dispatched = if !storage_text.trim().is_empty() {
        let args = serde_json::json!({
            "content": storage_text,
            "source": extraction_source_for(&item.source).as_str(),
            "source_ref": base_id,
            "sender": item.sender.clone().unwrap_or_default(),
            "chat_name": item.chat_name.clone().unwrap_or_default(),
            "sender_whatsapp_id": item.sender_whatsapp_id,
        });
        deps.tasks.enqueue(TaskEnvelope::new("identity.extract", args, QueueName::Default));
        true
    } else {
        false
    };

    info!(
        source_id = %base_id,
        chunks_written,
        extraction_dispatched,
        "ingested item"
    );

    Ok(IngestOutcome { chunks_written, skipped_duplicate: false, extraction_dispatched })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: &str, media: Option<MediaInfo>) -> SourceItem {
        SourceItem {
            text: "hello".to_string(),
            source: source.to_string(),
            source_native_id: "abc".to_string(),
            sender: None,
            chat_id: None,
            chat_name: None,
            is_group: false,
            timestamp: 0,
            media,
            thread_id: None,
            parent_native_id: None,
            sender_whatsapp_id: None,
        }
    }

    #[test]
    fn content_type_follows_media_kind() {
        let with_image = item(
            "whatsapp",
            Some(MediaInfo { media_type: "image".to_string(), media_url: None, media_path: None }),
        );
        assert_eq!(infer_content_type(&with_image), ContentType::Image);
    }

    #[test]
    fn call_recording_without_media_is_still_call_recording() {
        let plain = item("call_recording", None);
        assert_eq!(infer_content_type(&plain), ContentType::CallRecording);
    }

    #[test]
    fn text_is_the_default_content_type() {
        let plain = item("gmail", None);
        assert_eq!(infer_content_type(&plain), ContentType::Text);
    }

    #[test]
    fn extraction_source_maps_known_channels() {
        assert!(matches!(extraction_source_for("whatsapp"), archive_identity::ExtractionSource::Whatsapp));
        assert!(matches!(extraction_source_for("paperless"), archive_identity::ExtractionSource::Paperless));
        assert!(matches!(extraction_source_for("unknown_channel"), archive_identity::ExtractionSource::RagPipeline));
    }
}

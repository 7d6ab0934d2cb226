//! The retrieval engine (C8): the New → Condense → Resolve → Classify →
//! Expand → Retrieve → Rerank → Synthesize → PostProcess → Done state
//! machine (spec §4.8). Every step after Condense can short-circuit to Done
//! on a fatal error; each step retries once on a transient error before
//! giving up (spec §4.8, §7).

use std::collections::HashSet;
use std::sync::Arc;

use archive_costmeter::CostMeter;
use archive_identity::IdentityStore;
use archive_llm::{ChatRequest, Embedder, EmbedRequest, LlmProvider, Message, Reranker, RerankRequest, Role};
use archive_settings::SettingsStore;
use archive_vectorstore::{sparse, FilterValue, Predicate, ScoredChunk, SearchFilter, VectorStore};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;

use crate::entity_linking::resolve_persons;
use crate::error::EngineError;
use crate::expand::expand;
use crate::intent::{classify_query_intent, should_expand_asset_neighborhood, should_filter_by_person, QueryIntent};
use crate::prompt::{build_system_prompt, PromptContext};
use crate::rich_content::{RichContentBlock, RichContentProcessor};

/// Everything the engine needs to answer a question, held by the gateway
/// and passed down per request (spec §4.8, §6 `/rag/query` + `/rag/search`).
pub struct RetrievalDeps {
    pub settings: Arc<SettingsStore>,
    pub identity: Arc<IdentityStore>,
    pub vectorstore: Arc<VectorStore>,
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub cost_meter: Arc<CostMeter>,
    pub rich_content: RichContentProcessor,
}

#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub source: Option<String>,
    pub sender: Option<String>,
    pub timestamp_gte: Option<i64>,
    pub timestamp_lte: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub conversation_id: Option<String>,
    pub question: String,
    /// Prior turns, oldest first, as `(role, content)` pairs.
    pub history: Vec<(String, String)>,
    pub filters: QueryFilters,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub index: usize,
    pub source_id: String,
    pub source: String,
    pub sender: Option<String>,
    pub timestamp: i64,
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub rich_content: Vec<RichContentBlock>,
    pub cost_usd: f64,
    pub intents: Vec<String>,
}

fn setting_str(settings: &SettingsStore, key: &str, default: &str) -> String {
    settings
        .get(key)
        .ok()
        .flatten()
        .map(|s| s.value)
        .unwrap_or_else(|| default.to_string())
}

fn setting_usize(settings: &SettingsStore, key: &str, default: usize) -> usize {
    setting_str(settings, key, &default.to_string()).parse().unwrap_or(default)
}

fn setting_f64(settings: &SettingsStore, key: &str, default: f64) -> f64 {
    setting_str(settings, key, &default.to_string()).parse().unwrap_or(default)
}

fn setting_bool(settings: &SettingsStore, key: &str, default: bool) -> bool {
    setting_str(settings, key, &default.to_string())
        .parse()
        .unwrap_or(default)
}

fn configured_timezone(settings: &SettingsStore) -> Tz {
    setting_str(settings, "display.timezone", "UTC")
        .parse()
        .unwrap_or(chrono_tz::UTC)
}

/// Builds the search filter for a retrieval step (spec §4.8 step 5): the
/// user-supplied filters apply unconditionally; the intent-gated additions
/// (`person_ids`, `thread_id`) only apply when the matching intent actually
/// fired, so a `PERSON_FACTS`-only query (facts are injected directly into
/// the prompt, spec §4.8 step 4) doesn't also narrow the vector search.
fn build_filter(
    filters: &QueryFilters,
    intents: &HashSet<QueryIntent>,
    person_ids: &[i64],
    asset_refs: &[String],
) -> SearchFilter {
    let mut f = SearchFilter::new();
    if let Some(source) = &filters.source {
        f = f.push(Predicate::Eq("source".to_string(), FilterValue::Str(source.clone())));
    }
    if let Some(sender) = &filters.sender {
        f = f.push(Predicate::Eq("sender".to_string(), FilterValue::Str(sender.clone())));
    }
    if filters.timestamp_gte.is_some() || filters.timestamp_lte.is_some() {
        f = f.push(Predicate::Range {
            field: "timestamp".to_string(),
            gte: filters.timestamp_gte,
            lte: filters.timestamp_lte,
        });
    }
    if should_filter_by_person(intents) && !person_ids.is_empty() {
        f = f.push(Predicate::In(
            "person_ids".to_string(),
            person_ids.iter().map(|id| FilterValue::Int(*id)).collect(),
        ));
    }
    if should_expand_asset_neighborhood(intents) && !asset_refs.is_empty() {
        f = f.push(Predicate::In(
            "thread_id".to_string(),
            asset_refs.iter().map(|r| FilterValue::Str(r.clone())).collect(),
        ));
    }
    f
}

/// Runs Condense → Resolve → Classify → Expand → Retrieve → Rerank and
/// returns the fused, (optionally) reranked chunk list, the intents that
/// drove expansion, the condensed standalone question, and the expansion
/// result (injected facts, widened person/asset sets). Used directly by
/// `/rag/search` (raw, no synthesis) and as the first half of
/// [`answer_query`].
pub async fn retrieve_only(
    deps: &RetrievalDeps,
    req: &QueryRequest,
) -> Result<(Vec<ScoredChunk>, Vec<String>, String, crate::expand::ExpansionResult), EngineError> {
    let chat_model = setting_str(&deps.settings, "llm.chat_model", "gpt-4o-mini");
    let embed_model = setting_str(&deps.settings, "llm.embed_model", "text-embedding-3-large");
    let default_k = setting_usize(&deps.settings, "retrieval.default_k", 15);
    let min_score = setting_f64(&deps.settings, "retrieval.min_score", 0.2);
    let rerank_enabled = setting_bool(&deps.settings, "retrieval.rerank_enabled", false);

    let condensed = retry_once(|| crate::condense::condense_query(
        deps.llm.as_ref(),
        &chat_model,
        &req.question,
        &req.history,
    ))
    .await?;

    let resolved_person_ids = resolve_persons(&deps.identity, &condensed);
    let intents = classify_query_intent(&condensed, !resolved_person_ids.is_empty());
    let expansion = expand(&deps.identity, &intents, &resolved_person_ids);

    let embed_req = EmbedRequest { model: embed_model, inputs: vec![condensed.clone()] };
    let embed_resp = retry_once(|| async {
        deps.embedder
            .embed(&embed_req)
            .await
            .map_err(|e| EngineError::Embed(e.to_string()))
    })
    .await?;
    let dense_query = embed_resp
        .vectors
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::Embed("embedder returned no vectors".to_string()))?;
    let sparse_query = sparse::query_vector(&condensed);

    let filter = build_filter(
        &req.filters,
        &intents,
        &expansion.expanded_person_ids,
        &expansion.expanded_asset_refs,
    );
    let fetch_k = if rerank_enabled { (default_k * 3).max(default_k) } else { default_k };

    let mut chunks = retry_once(|| async {
        deps.vectorstore
            .search(dense_query.clone(), sparse_query.clone(), fetch_k, &filter)
            .await
            .map_err(|e| EngineError::Search(e.to_string()))
    })
    .await?;

    chunks.retain(|c| c.score >= min_score);

    if rerank_enabled && chunks.len() >= 5 {
        if let Some(reranker) = &deps.reranker {
            let rerank_model = setting_str(&deps.settings, "retrieval.rerank_model", "rerank-english-v3.0");
            let documents: Vec<String> = chunks.iter().map(|c| c.payload.text.clone()).collect();
            let rerank_req = RerankRequest {
                model: rerank_model,
                query: condensed.clone(),
                documents,
                top_n: default_k,
            };
            match reranker.rerank(&rerank_req).await {
                Ok(results) => {
                    chunks = results
                        .into_iter()
                        .filter_map(|r| chunks.get(r.index).cloned().map(|mut c| {
                            c.score = r.score as f64;
                            c
                        }))
                        .collect();
                }
                Err(e) => {
                    warn!(error = %e, "rerank failed, falling back to fused order");
                    chunks.truncate(default_k);
                }
            }
        }
    } else {
        chunks.truncate(default_k);
    }

    let intent_names: Vec<String> = intents.iter().map(|i| format!("{i:?}")).collect();

    Ok((chunks, intent_names, condensed, expansion))
}

/// Full pipeline for `/rag/query` (spec §4.8, §6): retrieval plus
/// synthesis, rich-content post-processing, and cost attribution. Never
/// returns `Err` — any fatal failure is folded into an apologetic answer
/// string per spec §7.
pub async fn answer_query(deps: &RetrievalDeps, req: QueryRequest) -> QueryResponse {
    let snapshot = deps.cost_meter.snapshot();

    let result = run_pipeline(deps, &req).await;

    let (answer_text, chunks, intent_names) = match result {
        Ok(triple) => triple,
        Err(e) => {
            warn!(error = %e, "retrieval pipeline failed");
            (format!("Sorry, I encountered an error: {}", e.short_reason()), Vec::new(), Vec::new())
        }
    };

    let (clean_answer, rich_blocks) = deps.rich_content.process(&answer_text, &chunks);

    let sources = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| SourceRef {
            index: i + 1,
            source_id: c.payload.source_id.clone(),
            source: c.payload.source.clone(),
            sender: c.payload.sender.clone(),
            timestamp: c.payload.timestamp,
            snippet: c.payload.text.chars().take(200).collect(),
            score: c.score,
        })
        .collect();

    let cost_usd = deps.cost_meter.delta_since(&snapshot);

    QueryResponse {
        answer: clean_answer,
        sources,
        rich_content: rich_blocks,
        cost_usd,
        intents: intent_names,
    }
}

async fn run_pipeline(
    deps: &RetrievalDeps,
    req: &QueryRequest,
) -> Result<(String, Vec<ScoredChunk>, Vec<String>), EngineError> {
    let (chunks, intent_names, _condensed, expansion) = retrieve_only(deps, req).await?;

    let chat_model = setting_str(&deps.settings, "llm.chat_model", "gpt-4o-mini");
    let tz = configured_timezone(&deps.settings);
    let person_names = resolve_person_names(&deps.identity, &expansion);

    let system = build_system_prompt(&PromptContext {
        now_tz: tz,
        chunks: &chunks,
        injected_facts: &expansion.injected_facts,
        person_names: &person_names,
    });

    let mut messages: Vec<Message> = req
        .history
        .iter()
        .map(|(role, content)| Message {
            role: if role == "assistant" { Role::Assistant } else { Role::User },
            content: content.clone(),
        })
        .collect();
    messages.push(Message { role: Role::User, content: req.question.clone() });

    let chat_req = ChatRequest { model: chat_model, system, messages, max_tokens: 1024, stream: false };
    let resp = retry_once(|| async {
        deps.llm
            .send(&chat_req)
            .await
            .map_err(|e| EngineError::Synthesis(e.to_string()))
    })
    .await?;

    Ok((resp.content, chunks, intent_names))
}

fn resolve_person_names(identity: &IdentityStore, expansion: &crate::expand::ExpansionResult) -> Vec<String> {
    expansion
        .expanded_person_ids
        .iter()
        .filter_map(|&id| identity.get_person(id).ok().flatten())
        .map(|p| p.canonical_name)
        .collect()
}

/// Retries a step exactly once when the error is transient (spec §4.8:
/// "transient errors retry once within the step").
async fn retry_once<F, Fut, T>(mut step: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    match step().await {
        Ok(v) => Ok(v),
        Err(e) if e.is_transient() => step().await,
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_filters_default_to_no_predicates() {
        let filters = QueryFilters::default();
        let intents = HashSet::from([QueryIntent::General]);
        let f = build_filter(&filters, &intents, &[], &[]);
        assert!(f.is_empty());
    }

    #[test]
    fn person_history_intent_adds_person_in_predicate() {
        let filters = QueryFilters::default();
        let intents = HashSet::from([QueryIntent::PersonHistory]);
        let f = build_filter(&filters, &intents, &[1, 2], &[]);
        assert!(!f.is_empty());
    }

    #[test]
    fn family_context_intent_adds_person_in_predicate() {
        let filters = QueryFilters::default();
        let intents = HashSet::from([QueryIntent::FamilyContext]);
        let f = build_filter(&filters, &intents, &[1], &[]);
        assert!(!f.is_empty());
    }

    #[test]
    fn person_facts_only_intent_does_not_filter_by_person() {
        let filters = QueryFilters::default();
        let intents = HashSet::from([QueryIntent::PersonFacts]);
        let f = build_filter(&filters, &intents, &[1], &[]);
        assert!(f.is_empty());
    }

    #[test]
    fn asset_intent_adds_thread_in_predicate() {
        let filters = QueryFilters::default();
        let intents = HashSet::from([QueryIntent::AssetThread]);
        let f = build_filter(&filters, &intents, &[], &["whatsapp:123".to_string()]);
        assert!(!f.is_empty());
    }

    #[test]
    fn general_intent_with_asset_refs_does_not_filter_by_thread() {
        let filters = QueryFilters::default();
        let intents = HashSet::from([QueryIntent::General]);
        let f = build_filter(&filters, &intents, &[], &["whatsapp:123".to_string()]);
        assert!(f.is_empty());
    }

    #[test]
    fn setting_helpers_fall_back_to_defaults() {
        let settings = SettingsStore::open_in_memory().unwrap();
        assert_eq!(setting_usize(&settings, "retrieval.default_k", 15), 15);
        assert!((setting_f64(&settings, "retrieval.min_score", 0.2) - 0.2).abs() < 1e-9);
        assert!(!setting_bool(&settings, "retrieval.rerank_enabled", false));
    }

    #[tokio::test]
    async fn retry_once_recovers_from_a_single_transient_failure() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<u32, EngineError> = retry_once(|| async {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                Err(EngineError::Search("timeout".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}

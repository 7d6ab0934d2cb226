//! `/rag/*` (spec §6, §4.8): the retrieval engine's HTTP surface.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use archive_retrieval::engine::{answer_query, retrieve_only, QueryFilters, QueryRequest};
use archive_vectorstore::{FilterValue, Predicate, SearchFilter};

use super::ApiError;
use crate::app::AppHost;

#[derive(Debug, Deserialize)]
pub struct QueryFiltersBody {
    pub chat_name: Option<String>,
    pub sender: Option<String>,
    pub source: Option<String>,
    /// Restrict results to the last N days (spec §6 `filter_days`).
    pub filter_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RagRequestBody {
    pub question: String,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub history: Vec<(String, String)>,
    pub filters: Option<QueryFiltersBody>,
    pub k: Option<usize>,
}

pub fn build_filters(body: Option<QueryFiltersBody>) -> QueryFilters {
    let Some(body) = body else {
        return QueryFilters::default();
    };
    let timestamp_gte = body.filter_days.map(|days| {
        chrono::Utc::now().timestamp() - days.max(0) * 86_400
    });
    QueryFilters {
        source: body.source,
        sender: body.sender.or(body.chat_name),
        timestamp_gte,
        timestamp_lte: None,
    }
}

pub fn into_query_request(body: RagRequestBody) -> QueryRequest {
    QueryRequest {
        conversation_id: body.conversation_id,
        question: body.question,
        history: body.history,
        filters: build_filters(body.filters),
    }
}

/// `POST /rag/query` — condense, retrieve, synthesize, post-process. Never
/// returns a 5xx for a synthesis failure: `answer_query` folds those into
/// an apologetic answer string per spec §7, and this handler persists both
/// turns to the conversation store when a `conversation_id` was given.
pub async fn query(State(host): State<Arc<AppHost>>, Json(body): Json<RagRequestBody>) -> Json<Value> {
    let conversation_id = body.conversation_id.clone();
    let question = body.question.clone();
    let req = into_query_request(body);

    let response = answer_query(&host.retrieval, req).await;

    if let Some(conversation_id) = &conversation_id {
        let _ = host
            .settings
            .append_message(conversation_id, "user", &question, 0.0);
        let _ = host.settings.append_message(
            conversation_id,
            "assistant",
            &response.answer,
            response.cost_usd,
        );
    }

    Json(json!({
        "answer": response.answer,
        "rich_content": response.rich_content,
        "sources": response.sources,
        "conversation_id": conversation_id,
        "cost_usd": response.cost_usd,
        "intents": response.intents,
    }))
}

/// `POST /rag/search` — raw retrieval, no synthesis (spec §6).
pub async fn search(
    State(host): State<Arc<AppHost>>,
    Json(body): Json<RagRequestBody>,
) -> Result<Json<Value>, ApiError> {
    let req = into_query_request(body);
    let (chunks, intents, condensed, expansion) = retrieve_only(&host.retrieval, &req)
        .await
        .map_err(|e| archive_core::error::ArchiveError::ExternalUnavailable(e.to_string()))?;

    let results: Vec<Value> = chunks
        .iter()
        .map(|c| {
            json!({
                "score": c.score,
                "source": c.payload.source,
                "sender": c.payload.sender,
                "chat_name": c.payload.chat_name,
                "content": c.payload.text,
                "timestamp": c.payload.timestamp,
            })
        })
        .collect();

    Ok(Json(json!({
        "results": results,
        "intents": intents,
        "condensed_question": condensed,
        "injected_facts": expansion.injected_facts,
        "expanded_person_ids": expansion.expanded_person_ids,
    })))
}

/// `POST /rag/reset` — drop every chunk from the collection (spec §6).
pub async fn reset(State(host): State<Arc<AppHost>>) -> Result<Json<Value>, ApiError> {
    host.vectorstore
        .delete_by_filter(&SearchFilter::new())
        .await?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
pub struct DeleteBySourceBody {
    pub source: String,
}

/// `POST /rag/delete-by-source` (spec §6).
pub async fn delete_by_source(
    State(host): State<Arc<AppHost>>,
    Json(body): Json<DeleteBySourceBody>,
) -> Result<Json<Value>, ApiError> {
    let filter = SearchFilter::new().push(Predicate::Eq(
        "source".to_string(),
        FilterValue::Str(body.source),
    ));
    host.vectorstore.delete_by_filter(&filter).await?;
    Ok(Json(json!({"status": "ok"})))
}

/// `GET /rag/stats` (spec §6) — total chunk count plus a per-source
/// breakdown across every registered plugin's channel tag.
pub async fn stats(State(host): State<Arc<AppHost>>) -> Result<Json<Value>, ApiError> {
    let known_sources: Vec<String> = host
        .plugins
        .summaries()
        .into_iter()
        .map(|s| s.name)
        .collect();
    let known_refs: Vec<&str> = known_sources.iter().map(String::as_str).collect();
    let stats = host.vectorstore.collection_stats(&known_refs).await?;
    Ok(Json(json!({
        "total": stats.total,
        "by_source": stats.by_source,
    })))
}

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{ProviderError, RerankRequest, RerankResult, Reranker};

/// HTTP cross-encoder reranking service (spec §4.8 step 6). The wire shape
/// follows the common `{query, documents, top_n}` → `{results:[{index,
/// relevance_score}]}` convention shared by Cohere-style and self-hosted
/// rerank servers, so this one client covers both without a vendor lock-in.
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpReranker {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    fn name(&self) -> &str {
        "cross-encoder"
    }

    async fn rerank(&self, req: &RerankRequest) -> Result<Vec<RerankResult>, ProviderError> {
        debug!(candidates = req.documents.len(), "reranking candidates");
        let url = format!("{}/rerank", self.base_url);
        let body = serde_json::json!({
            "model": req.model,
            "query": req.query,
            "documents": req.documents,
            "top_n": req.top_n,
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: 5000,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "rerank service error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let parsed: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let mut results: Vec<RerankResult> = parsed
            .results
            .into_iter()
            .map(|r| RerankResult {
                index: r.index,
                score: r.relevance_score,
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(req.top_n.max(1));
        Ok(results)
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    results: Vec<ApiResult>,
}

#[derive(Deserialize)]
struct ApiResult {
    index: usize,
    relevance_score: f32,
}

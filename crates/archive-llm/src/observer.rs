use std::sync::Arc;

use async_trait::async_trait;

use crate::provider::{
    ChatRequest, ChatResponse, EmbedRequest, EmbedResponse, Embedder, LlmProvider, ProviderError,
    RerankRequest, RerankResult, Reranker,
};

/// A single observed call, reported to every registered [`LlmCallObserver`]
/// after the underlying HTTP call returns (success or failure). This models
/// spec §4.2's "callback hook registered on the LLM framework": the cost
/// meter is one observer implementation, but tests can register their own
/// counters without touching the provider code.
#[derive(Debug, Clone)]
pub struct CallEvent {
    pub provider: String,
    pub model: String,
    pub kind: CallKind,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Chat,
    Embed,
    Rerank,
}

#[async_trait]
pub trait LlmCallObserver: Send + Sync {
    async fn on_call_complete(&self, event: CallEvent);
}

/// Wraps any [`LlmProvider`]/[`Embedder`]/[`Reranker`] and fans every
/// completed call out to a list of observers. This is the single
/// interception point C2 attaches to; nothing else in the system talks to a
/// raw provider directly.
pub struct Observed<T> {
    inner: T,
    observers: Vec<Arc<dyn LlmCallObserver>>,
}

impl<T> Observed<T> {
    pub fn new(inner: T, observers: Vec<Arc<dyn LlmCallObserver>>) -> Self {
        Self { inner, observers }
    }

    async fn notify(&self, event: CallEvent) {
        for obs in &self.observers {
            obs.on_call_complete(event.clone()).await;
        }
    }
}

#[async_trait]
impl<T: LlmProvider> LlmProvider for Observed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let result = self.inner.send(req).await;
        let event = CallEvent {
            provider: self.inner.name().to_string(),
            model: req.model.clone(),
            kind: CallKind::Chat,
            tokens_in: result.as_ref().map(|r| r.tokens_in).unwrap_or(0),
            tokens_out: result.as_ref().map(|r| r.tokens_out).unwrap_or(0),
            ok: result.is_ok(),
        };
        self.notify(event).await;
        result
    }
}

#[async_trait]
impl<T: Embedder> Embedder for Observed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, req: &EmbedRequest) -> Result<EmbedResponse, ProviderError> {
        let result = self.inner.embed(req).await;
        let event = CallEvent {
            provider: self.inner.name().to_string(),
            model: req.model.clone(),
            kind: CallKind::Embed,
            tokens_in: result.as_ref().map(|r| r.tokens).unwrap_or(0),
            tokens_out: 0,
            ok: result.is_ok(),
        };
        self.notify(event).await;
        result
    }
}

#[async_trait]
impl<T: Reranker> Reranker for Observed<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn rerank(&self, req: &RerankRequest) -> Result<Vec<RerankResult>, ProviderError> {
        let result = self.inner.rerank(req).await;
        let event = CallEvent {
            provider: self.inner.name().to_string(),
            model: req.model.clone(),
            kind: CallKind::Rerank,
            tokens_in: 0,
            tokens_out: 0,
            ok: result.is_ok(),
        };
        self.notify(event).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(Arc<AtomicUsize>);

    #[async_trait]
    impl LlmCallObserver for CountingObserver {
        async fn on_call_complete(&self, _event: CallEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubProvider;

    #[async_trait]
    impl LlmProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "hi".into(),
                model: req.model.clone(),
                tokens_in: 10,
                tokens_out: 5,
                stop_reason: "stop".into(),
            })
        }
    }

    #[tokio::test]
    async fn observer_fires_once_per_call() {
        let count = Arc::new(AtomicUsize::new(0));
        let observed = Observed::new(
            StubProvider,
            vec![Arc::new(CountingObserver(count.clone()))],
        );
        let req = ChatRequest {
            model: "m".into(),
            system: String::new(),
            messages: vec![],
            max_tokens: 10,
            stream: false,
        };
        observed.send(&req).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

//! Host process wiring (spec §6): builds a concrete instance of every
//! component once at startup and exposes the HTTP surface over them.
//!
//! Mirrors the donor gateway's `AppState`/`build_router()` split — one
//! struct holding every dependency behind an `Arc`, cheaply cloned into
//! each request handler via axum's `State` extractor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use once_cell::sync::OnceCell;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use archive_core::config::ArchiveConfig;
use archive_core::error::Result;
use archive_costmeter::{CostMeter, CostMeterObserver};
use archive_identity::IdentityStore;
use archive_ingest::pii::PiiRedactor;
use archive_ingest::IngestDeps;
use archive_llm::router::ProviderSlot;
use archive_llm::{Embedder, LlmProvider, Observed, ProviderRouter, Reranker};
use archive_plugin_callrec::CallRecordingPlugin;
use archive_plugin_documents::DocumentsPlugin;
use archive_plugin_messaging::MessagingPlugin;
use archive_plugins::{PluginHost, PluginRegistry};
use archive_retrieval::rich_content::RichContentProcessor;
use archive_retrieval::RetrievalDeps;
use archive_settings::SettingsStore;
use archive_tasks::{TaskEnvelope, TaskError, TaskQueue};
use archive_vectorstore::VectorStore;

use crate::http;

/// Short commit hash baked in at compile time by `build.rs`, surfaced on
/// `GET /health` for ops visibility into what's actually deployed.
pub const GIT_SHA: &str = env!("ARCHIVE_GIT_SHA");

/// Every dependency the HTTP handlers need, built once at `serve` startup.
/// Handlers receive this behind an `axum::extract::State<Arc<AppHost>>`.
pub struct AppHost {
    pub config: ArchiveConfig,
    pub settings: Arc<SettingsStore>,
    pub identity: Arc<IdentityStore>,
    pub vectorstore: Arc<VectorStore>,
    pub cost_meter: Arc<CostMeter>,
    pub plugins: Arc<PluginRegistry>,
    pub tasks: Arc<TaskQueue>,
    pub ingest: Arc<IngestDeps>,
    pub retrieval: RetrievalDeps,
}

fn setting_str(settings: &SettingsStore, key: &str, default: &str) -> String {
    settings
        .get(key)
        .ok()
        .flatten()
        .map(|s| s.value)
        .unwrap_or_else(|| default.to_string())
}

fn new_observer(cost_meter: &Arc<CostMeter>) -> Arc<dyn archive_llm::LlmCallObserver> {
    Arc::new(CostMeterObserver {
        meter: cost_meter.clone(),
        conversation_id: None,
        request_context: None,
    })
}

/// Build the chat provider router from whichever providers the config
/// supplies, each wrapped so the cost meter observes every call (spec
/// §4.2 "intercepted via a callback hook registered on the LLM framework").
fn build_chat_provider(config: &ArchiveConfig, cost_meter: &Arc<CostMeter>) -> Arc<dyn LlmProvider> {
    let mut slots = Vec::new();
    if let Some(anthropic) = &config.providers.anthropic {
        let provider = archive_llm::anthropic::AnthropicProvider::new(
            anthropic.api_key.clone(),
            Some(anthropic.base_url.clone()),
        );
        let observed = Observed::new(provider, vec![new_observer(cost_meter)]);
        slots.push(ProviderSlot::new(Box::new(observed), 2));
    }
    if let Some(openai) = &config.providers.openai {
        let provider = archive_llm::openai::OpenAiProvider::new(
            openai.api_key.clone(),
            Some(openai.base_url.clone()),
        );
        let observed = Observed::new(provider, vec![new_observer(cost_meter)]);
        slots.push(ProviderSlot::new(Box::new(observed), 2));
    }
    for entry in &config.providers.openai_compat {
        let provider =
            archive_llm::openai::OpenAiProvider::new(entry.api_key.clone(), Some(entry.base_url.clone()));
        let observed = Observed::new(provider, vec![new_observer(cost_meter)]);
        slots.push(ProviderSlot::new(Box::new(observed), 1));
    }

    if slots.is_empty() {
        warn!(
            "no chat provider configured — /rag/query will fail auth until providers.openai \
             or providers.anthropic is set"
        );
        // ProviderRouter requires at least one slot; an empty-key OpenAI
        // slot lets the process boot and fail each call with an auth error
        // instead of panicking here.
        let provider = archive_llm::openai::OpenAiProvider::new(String::new(), None);
        slots.push(ProviderSlot::new(
            Box::new(Observed::new(provider, vec![new_observer(cost_meter)])),
            0,
        ));
    }

    Arc::new(ProviderRouter::new(slots))
}

fn build_embedder(config: &ArchiveConfig, cost_meter: &Arc<CostMeter>) -> Arc<dyn Embedder> {
    let (api_key, base_url) = config
        .providers
        .openai
        .as_ref()
        .map(|o| (o.api_key.clone(), Some(o.base_url.clone())))
        .unwrap_or_default();
    let provider = archive_llm::openai::OpenAiProvider::new(api_key, base_url);
    Arc::new(Observed::new(provider, vec![new_observer(cost_meter)]))
}

/// A reranker is only built once `retrieval.rerank_base_url` is set — spec
/// §4.8 treats rerank as optional ("only if `retrieval.rerank_enabled`").
fn build_reranker(settings: &SettingsStore, cost_meter: &Arc<CostMeter>) -> Option<Arc<dyn Reranker>> {
    let base_url = setting_str(settings, "retrieval.rerank_base_url", "");
    if base_url.is_empty() {
        return None;
    }
    let api_key = setting_str(settings, "retrieval.rerank_api_key", "");
    let api_key = if api_key.is_empty() { None } else { Some(api_key) };
    let provider = archive_llm::rerank::HttpReranker::new(base_url, api_key);
    Some(Arc::new(Observed::new(provider, vec![new_observer(cost_meter)])))
}

type TaskBody = Arc<
    dyn Fn(TaskEnvelope) -> Pin<Box<dyn Future<Output = std::result::Result<(), TaskError>> + Send>>
        + Send
        + Sync,
>;

/// Handle the `identity.extract` task dispatched from the ingestion
/// pipeline's step 7 (spec §4.5). Args mirror `ExtractionRequest`'s
/// fields, carried as JSON since a task body only gets `serde_json::Value`
/// (spec §6 task message shape).
async fn handle_identity_extract(
    identity: &IdentityStore,
    llm: &dyn LlmProvider,
    envelope: TaskEnvelope,
) -> std::result::Result<(), TaskError> {
    let args = envelope.args;
    let content = args["content"].as_str().unwrap_or_default().to_string();
    let source_ref = args["source_ref"].as_str().unwrap_or_default().to_string();
    let sender = args["sender"].as_str().unwrap_or_default().to_string();
    let chat_name = args["chat_name"].as_str().unwrap_or_default().to_string();
    let sender_whatsapp_id = args["sender_whatsapp_id"].as_str().map(String::from);
    let model = args["model"].as_str().unwrap_or("gpt-4o-mini").to_string();

    let source = match args["source"].as_str().unwrap_or("rag_pipeline") {
        "whatsapp" => archive_identity::ExtractionSource::Whatsapp,
        "gmail" => archive_identity::ExtractionSource::Gmail,
        "paperless" => archive_identity::ExtractionSource::Paperless,
        "call_recording" => archive_identity::ExtractionSource::CallRecording,
        "chat_correction" => archive_identity::ExtractionSource::ChatCorrection,
        _ => archive_identity::ExtractionSource::RagPipeline,
    };

    let req = archive_identity::ExtractionRequest {
        content: &content,
        source,
        source_ref: &source_ref,
        sender: &sender,
        chat_name: &chat_name,
        sender_whatsapp_id: sender_whatsapp_id.as_deref(),
        confidence: None,
        model: &model,
    };

    archive_identity::submit_extraction(identity, llm, req)
        .await
        .map(|_| ())
        .map_err(|e| TaskError::classify(e.to_string()))
}

/// Handle the `webhook.ingest` task a plugin's webhook handler enqueues
/// rather than running the ingestion pipeline inline on the request path
/// (spec §4.7: ingestion work belongs on the task runtime).
async fn handle_webhook_ingest(
    deps: &IngestDeps,
    envelope: TaskEnvelope,
) -> std::result::Result<(), TaskError> {
    let item: archive_ingest::SourceItem = serde_json::from_value(envelope.args)
        .map_err(|e| TaskError::Fatal(format!("malformed webhook.ingest args: {e}")))?;
    archive_ingest::ingest(deps, item)
        .await
        .map(|_| ())
        .map_err(|e| TaskError::classify(e.to_string()))
}

impl AppHost {
    pub async fn build(config: ArchiveConfig) -> Result<Arc<Self>> {
        let settings = Arc::new(SettingsStore::open(&config.database.settings_path)?);
        settings.seed_boot()?;

        let identity = Arc::new(IdentityStore::open(&config.database.identity_path)?);
        let cost_meter = Arc::new(CostMeter::open(
            &config.database.settings_path.replace("archive.db", "cost.db"),
        )?);

        let vectorstore = Arc::new(
            VectorStore::connect(
                &config.vectorstore.url,
                &config.vectorstore.collection,
                config.vectorstore.dense_dim,
            )
            .await?,
        );

        let llm = build_chat_provider(&config, &cost_meter);
        let embedder = build_embedder(&config, &cost_meter);
        let reranker = build_reranker(&settings, &cost_meter);

        let default_embed_model = config
            .providers
            .openai
            .as_ref()
            .map(|o| o.embed_model.clone())
            .unwrap_or_else(|| "text-embedding-3-large".to_string());
        let embed_model = setting_str(&settings, "llm.embed_model", &default_embed_model);

        // `IngestDeps` needs `Arc<TaskQueue>`, and the `webhook.ingest` task
        // body needs `IngestDeps` — resolved by handing the dispatch
        // closure a cell that's filled in once `IngestDeps` itself exists.
        // Enqueues only start flowing once plugins initialize below, by
        // which point the cell is always set.
        let ingest_cell: Arc<OnceCell<Arc<IngestDeps>>> = Arc::new(OnceCell::new());

        let identity_for_tasks = identity.clone();
        let llm_for_tasks = llm.clone();
        let cell_for_tasks = ingest_cell.clone();
        let tasks = TaskQueue::start(move |task_name| -> Option<TaskBody> {
            match task_name {
                "identity.extract" => {
                    let identity = identity_for_tasks.clone();
                    let llm = llm_for_tasks.clone();
                    Some(Arc::new(move |envelope: TaskEnvelope| {
                        let identity = identity.clone();
                        let llm = llm.clone();
                        Box::pin(async move { handle_identity_extract(&identity, llm.as_ref(), envelope).await })
                            as Pin<Box<dyn Future<Output = std::result::Result<(), TaskError>> + Send>>
                    }))
                }
                "webhook.ingest" => {
                    let cell = cell_for_tasks.clone();
                    Some(Arc::new(move |envelope: TaskEnvelope| {
                        let cell = cell.clone();
                        Box::pin(async move {
                            match cell.get() {
                                Some(deps) => handle_webhook_ingest(deps, envelope).await,
                                None => {
                                    Err(TaskError::Transient("ingest deps not yet initialized".to_string()))
                                }
                            }
                        })
                            as Pin<Box<dyn Future<Output = std::result::Result<(), TaskError>> + Send>>
                    }))
                }
                _ => None,
            }
        });
        let tasks = Arc::new(tasks);

        let ingest = Arc::new(IngestDeps {
            identity: identity.clone(),
            vectorstore: vectorstore.clone(),
            embedder: embedder.clone(),
            tasks: tasks.clone(),
            pii: PiiRedactor::new(),
            embed_model,
        });
        ingest_cell.set(ingest.clone()).ok();

        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(MessagingPlugin::new()));
        plugins.register(Arc::new(DocumentsPlugin::new()));
        plugins.register(Arc::new(CallRecordingPlugin::new()));
        let plugins = Arc::new(plugins);

        let host = PluginHost::new(settings.clone(), ingest.clone());
        plugins.initialize_all(host).await;

        let tz: chrono_tz::Tz = setting_str(&settings, "display.timezone", "UTC")
            .parse()
            .unwrap_or(chrono_tz::UTC);
        let rich_content = RichContentProcessor::new(config.media.events_dir.clone(), tz)
            .with_media_dir(config.media.images_dir.clone());

        let retrieval = RetrievalDeps {
            settings: settings.clone(),
            identity: identity.clone(),
            vectorstore: vectorstore.clone(),
            llm: llm.clone(),
            embedder: embedder.clone(),
            reranker,
            cost_meter: cost_meter.clone(),
            rich_content,
        };

        info!("archive host initialized");

        Ok(Arc::new(Self {
            config,
            settings,
            identity,
            vectorstore,
            cost_meter,
            plugins,
            tasks,
            ingest,
            retrieval,
        }))
    }

    /// Shut down every registered plugin. Called on graceful exit.
    pub async fn shutdown(&self) {
        self.plugins.shutdown_all().await;
    }
}

/// Mount the full HTTP surface (spec §6). `archive-core`'s error type maps
/// to status codes uniformly via `http::error_response`.
pub fn build_router(host: Arc<AppHost>) -> Router {
    Router::new()
        .route("/health", get(http::health::health))
        .route("/webhook", axum::routing::post(http::webhooks::legacy_webhook))
        .route(
            "/plugins/:plugin/webhook",
            axum::routing::post(http::webhooks::plugin_webhook),
        )
        .route("/plugins/:plugin/status", get(http::webhooks::plugin_status))
        .route(
            "/plugins/:plugin/sync",
            axum::routing::post(http::webhooks::plugin_sync),
        )
        .route("/rag/query", axum::routing::post(http::rag::query))
        .route("/rag/search", axum::routing::post(http::rag::search))
        .route("/rag/reset", axum::routing::post(http::rag::reset))
        .route(
            "/rag/delete-by-source",
            axum::routing::post(http::rag::delete_by_source),
        )
        .route("/rag/stats", get(http::rag::stats))
        .route(
            "/conversations",
            get(http::conversations::list).post(http::conversations::create),
        )
        .route(
            "/conversations/:id",
            get(http::conversations::get_one)
                .patch(http::conversations::rename)
                .delete(http::conversations::delete),
        )
        .route(
            "/settings",
            get(http::settings::list).post(http::settings::update),
        )
        .route("/settings/reset", axum::routing::post(http::settings::reset))
        .route("/media/images/:name", get(http::media::image))
        .route("/media/events/:name", get(http::media::event))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(host)
}

//! Plugin webhook ingress (spec §6): `POST /plugins/<plugin>/webhook`, the
//! legacy `POST /webhook` alias (messaging plugin), and the optional
//! per-plugin `status`/`sync` routes.
//!
//! A webhook handler never runs the ingestion pipeline inline — per spec
//! §4.7 that work belongs on the task runtime, and per spec §5 "webhook
//! handlers fail fast... so the source channel retries" the handler's only
//! job is to validate the plugin exists, parse the payload, and enqueue.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use archive_tasks::{QueueName, TaskEnvelope};

use super::ApiError;
use crate::app::AppHost;

async fn dispatch_webhook(
    host: &Arc<AppHost>,
    plugin_name: &str,
    payload: Value,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let plugin = host.plugins.get(plugin_name).ok_or_else(|| {
        warn!(plugin = %plugin_name, "webhook for unknown/disabled plugin");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "unknown or disabled plugin"})),
        )
    })?;

    let item = plugin.process_webhook(payload).await.map_err(|e| {
        warn!(plugin = %plugin_name, error = %e, "webhook payload rejected by plugin");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": e.to_string()})),
        )
    })?;

    let Some(item) = item else {
        // Filtered out (read receipt, non-message event, ...) — still a
        // successful webhook delivery from the source's point of view.
        return Ok(Json(json!({"status": "ok"})));
    };

    let args = serde_json::to_value(&item).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })?;
    host.tasks
        .enqueue(TaskEnvelope::new("webhook.ingest", args, QueueName::Default));

    Ok(Json(json!({"status": "ok"})))
}

/// `POST /plugins/:plugin/webhook`
pub async fn plugin_webhook(
    State(host): State<Arc<AppHost>>,
    Path(plugin): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    dispatch_webhook(&host, &plugin, payload).await
}

/// `POST /webhook` — legacy alias mapped to the messaging plugin (spec §6).
pub async fn legacy_webhook(
    State(host): State<Arc<AppHost>>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    dispatch_webhook(&host, "whatsapp", payload).await
}

/// `GET /plugins/:plugin/status`
pub async fn plugin_status(
    State(host): State<Arc<AppHost>>,
    Path(plugin): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let plugin = host
        .plugins
        .get(&plugin)
        .ok_or_else(|| archive_core::error::ArchiveError::NotFound(format!("plugin '{plugin}'")))?;
    let checks = plugin.health_check().await;
    Ok(Json(json!({
        "name": plugin.name(),
        "display_name": plugin.display_name(),
        "version": plugin.version(),
        "checks": checks,
    })))
}

/// `POST /plugins/:plugin/sync` — trigger the plugin's pull-based sync
/// immediately rather than waiting for the scheduler tick (spec §4.6 step 4).
pub async fn plugin_sync(
    State(host): State<Arc<AppHost>>,
    Path(plugin): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let plugin = host
        .plugins
        .get(&plugin)
        .ok_or_else(|| archive_core::error::ArchiveError::NotFound(format!("plugin '{plugin}'")))?;
    let ingested = plugin
        .scheduled_sync()
        .await
        .map_err(archive_core::error::ArchiveError::from)?;
    Ok(Json(json!({"ingested": ingested})))
}

//! `GET /health` (spec §6): liveness plus aggregated dependency status.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppHost;

/// Aggregates plugin health checks and a Qdrant reachability probe into a
/// single `healthy | degraded | down` verdict. `healthy` only when every
/// plugin and the vector store report clean; `down` only when the vector
/// store itself is unreachable, since nothing else can serve traffic
/// without it; anything else in between is `degraded`.
pub async fn health(State(host): State<Arc<AppHost>>) -> Json<Value> {
    let plugin_health = host.plugins.health_checks().await;

    let vectorstore_ok = host
        .vectorstore
        .collection_stats(&[])
        .await
        .is_ok();

    let mut dependencies = serde_json::Map::new();
    dependencies.insert(
        "vectorstore".to_string(),
        json!(if vectorstore_ok { "ok" } else { "down" }),
    );
    let mut any_plugin_unhealthy = false;
    for (name, checks) in &plugin_health {
        let unhealthy = checks.values().any(|v| v != "ok" && !v.is_empty());
        if unhealthy {
            any_plugin_unhealthy = true;
        }
        dependencies.insert(name.clone(), json!(checks));
    }

    let status = if !vectorstore_ok {
        "down"
    } else if any_plugin_unhealthy {
        "degraded"
    } else {
        "healthy"
    };

    Json(json!({
        "status": status,
        "dependencies": dependencies,
        "git_sha": crate::app::GIT_SHA,
    }))
}

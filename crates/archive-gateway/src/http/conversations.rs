//! `/conversations*` (spec §6, SPEC_FULL conversation store supplement).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use archive_core::error::ArchiveError;

use super::ApiError;
use crate::app::AppHost;

#[derive(Debug, Deserialize)]
pub struct CreateConversationBody {
    pub title: Option<String>,
}

/// `GET /conversations`
pub async fn list(State(host): State<Arc<AppHost>>) -> Result<Json<Value>, ApiError> {
    let conversations = host.settings.list_conversations()?;
    Ok(Json(json!({ "conversations": conversations })))
}

/// `POST /conversations`
pub async fn create(
    State(host): State<Arc<AppHost>>,
    Json(body): Json<CreateConversationBody>,
) -> Result<Json<Value>, ApiError> {
    let conversation = host.settings.create_conversation(body.title.as_deref())?;
    Ok(Json(json!(conversation)))
}

/// `GET /conversations/:id` — metadata plus the full message history.
pub async fn get_one(
    State(host): State<Arc<AppHost>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let conversation = host
        .settings
        .get_conversation(&id)?
        .ok_or_else(|| ArchiveError::NotFound(format!("conversation '{id}'")))?;
    let messages = host.settings.get_messages(&id)?;
    Ok(Json(json!({
        "conversation": conversation,
        "messages": messages,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RenameConversationBody {
    pub title: String,
}

/// `PATCH /conversations/:id`
pub async fn rename(
    State(host): State<Arc<AppHost>>,
    Path(id): Path<String>,
    Json(body): Json<RenameConversationBody>,
) -> Result<Json<Value>, ApiError> {
    host.settings.rename_conversation(&id, &body.title)?;
    Ok(Json(json!({"status": "ok"})))
}

/// `DELETE /conversations/:id`
pub async fn delete(
    State(host): State<Arc<AppHost>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    host.settings.delete_conversation(&id)?;
    Ok(Json(json!({"status": "ok"})))
}

//! `/settings*` (spec §6, §4.1): the typed key/value settings surface.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ApiError;
use crate::app::AppHost;

#[derive(Debug, Deserialize)]
pub struct ListSettingsQuery {
    pub category: Option<String>,
}

/// `GET /settings[?category=...]` — values come back masked for
/// `Secret`-typed rows (spec §4.1 "never returns raw secret values over
/// the settings-read surface").
pub async fn list(
    State(host): State<Arc<AppHost>>,
    Query(query): Query<ListSettingsQuery>,
) -> Result<Json<Value>, ApiError> {
    let settings = match &query.category {
        Some(category) => host.settings.get_by_category(category)?,
        None => host.settings.all()?,
    };
    let masked: Vec<Value> = settings
        .iter()
        .map(|s| {
            json!({
                "key": s.key,
                "value": s.masked_value(),
                "category": s.category,
                "type": s.setting_type,
                "description": s.description,
                "updated_at": s.updated_at,
            })
        })
        .collect();
    let categories = host.settings.categories()?;
    Ok(Json(json!({ "settings": masked, "categories": categories })))
}

/// `POST /settings` — body is a flat `{key: value}` map, written in one
/// transaction via `set_many` (spec §4.1 `Set`/`SetMany`).
pub async fn update(
    State(host): State<Arc<AppHost>>,
    Json(values): Json<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    host.settings.set_many(&values)?;
    Ok(Json(json!({"status": "ok"})))
}

#[derive(Debug, Deserialize)]
pub struct ResetSettingsBody {
    pub category: Option<String>,
}

/// `POST /settings/reset` — restore built-in defaults, optionally scoped
/// to one category (spec §4.1 `ResetDefaults`).
pub async fn reset(
    State(host): State<Arc<AppHost>>,
    Json(body): Json<ResetSettingsBody>,
) -> Result<Json<Value>, ApiError> {
    host.settings.reset_defaults(body.category.as_deref())?;
    Ok(Json(json!({"status": "ok"})))
}

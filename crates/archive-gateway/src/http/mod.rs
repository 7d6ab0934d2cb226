//! The gateway's HTTP surface (spec §6), one module per route group.

pub mod conversations;
pub mod health;
pub mod media;
pub mod rag;
pub mod settings;
pub mod webhooks;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use archive_core::error::ArchiveError;

/// Wraps [`ArchiveError`] so every handler can simply return
/// `Result<T, ApiError>` and get the spec §7 JSON error body (`code`,
/// `message`) at the status its `.status()` maps to, with no per-handler
/// boilerplate.
#[derive(Debug)]
pub struct ApiError(pub ArchiveError);

impl From<ArchiveError> for ApiError {
    fn from(e: ArchiveError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

//! `GET /media/images/<name>` and `GET /media/events/<name>` (spec §6):
//! serves the files `RichContentProcessor` writes under the configured
//! media directories back to callers.

use std::path::{Path as StdPath, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs;

use archive_core::error::ArchiveError;

use super::ApiError;
use crate::app::AppHost;

/// Rejects any name containing a path separator or `..` component so a
/// caller can't escape the media directory.
pub fn safe_join(dir: &str, name: &str) -> Result<PathBuf, ApiError> {
    if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
        return Err(ApiError(ArchiveError::InvalidInput(format!(
            "invalid media name '{name}'"
        ))));
    }
    Ok(StdPath::new(dir).join(name))
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("ics") => "text/calendar",
        _ => "application/octet-stream",
    }
}

async fn serve(path: PathBuf) -> Result<Response, ApiError> {
    let bytes = fs::read(&path).await.map_err(|_| {
        ApiError(ArchiveError::NotFound(format!(
            "media file '{}'",
            path.display()
        )))
    })?;
    let content_type = content_type_for(&path);
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(bytes),
    )
        .into_response())
}

/// `GET /media/images/:name`
pub async fn image(
    State(host): State<Arc<AppHost>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let path = safe_join(&host.config.media.images_dir, &name)?;
    serve(path).await
}

/// `GET /media/events/:name`
pub async fn event(
    State(host): State<Arc<AppHost>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let path = safe_join(&host.config.media.events_dir, &name)?;
    serve(path).await
}

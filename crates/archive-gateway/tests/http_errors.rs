//! `ApiError` must translate every `ArchiveError` variant into the status
//! code spec §7 assigns it, with the short code in the JSON body rather
//! than a raw error string.

use archive_core::error::ArchiveError;
use archive_gateway::http::ApiError;
use axum::http::StatusCode;
use axum::response::IntoResponse;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn not_found_maps_to_404() {
    let response = ApiError(ArchiveError::NotFound("conversation 'x'".into())).into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn external_unavailable_maps_to_503() {
    let response = ApiError(ArchiveError::ExternalUnavailable("qdrant down".into())).into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn invalid_input_maps_to_400() {
    let response = ApiError(ArchiveError::InvalidInput("bad media name".into())).into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rate_limited_maps_to_429() {
    let response = ApiError(ArchiveError::RateLimited("provider".into(), 30)).into_response();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("30s"));
}

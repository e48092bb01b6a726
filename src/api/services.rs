use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use http_body_util::BodyExt;

use super::{models::AddItemRequest, state::AppState};
use crate::api::error::ApiError;

/// Item submission endpoint (POST /api/items)
///
/// Accepts `{ "locator": ... }`, hands the locator to the acquisition
/// engine, and records the new item. Responds 202 Accepted with the
/// engine-assigned identifier; the download continues in the background
/// and is visible through the list/get endpoints and the WebSocket feed.
pub async fn add_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let body_bytes = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes();
    super::utils::enforce_payload_limit(&body_bytes, state.config.api.max_payload_bytes)?;

    let request: AddItemRequest = serde_json::from_slice(&body_bytes)?;
    let locator = request.locator.trim();
    if locator.is_empty() {
        return Err(ApiError::InvalidPayload("locator must not be empty".into()));
    }

    let item = state.orchestrator.add_item(locator).await?;

    let response = super::models::AddItemResponse { id: item.id };
    Ok((axum::http::StatusCode::ACCEPTED, Json(response)))
}

/// Full item listing (GET /api/items)
///
/// A snapshot of every tracked item, live and stale alike; the same
/// payload the WebSocket feed pushes periodically.
pub async fn list_items(State(state): State<AppState>) -> impl IntoResponse {
    let items = state.orchestrator.list_items().await;
    (axum::http::StatusCode::OK, Json(items))
}

/// Single item lookup (GET /api/items/{id})
///
/// Converted items get their probed media file info attached lazily on
/// first read.
pub async fn get_item(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.orchestrator.get_item(&id).await?;
    Ok((axum::http::StatusCode::OK, Json(item)))
}

/// Item removal (DELETE /api/items/{id})
///
/// Cancels the download in the engine and drops the record.
pub async fn delete_item(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.delete_item(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Pause a download (POST /api/items/{id}/pause)
pub async fn pause_item(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.orchestrator.pause_item(&id).await?;
    Ok((axum::http::StatusCode::OK, Json(item)))
}

/// Resume a paused download (POST /api/items/{id}/resume)
pub async fn resume_item(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.orchestrator.resume_item(&id).await?;
    Ok((axum::http::StatusCode::OK, Json(item)))
}

/// Queue a completed item for conversion (POST /api/items/{id}/convert)
///
/// Idempotent for already scheduled items. A full queue is answered with
/// 429 and may simply be retried.
pub async fn convert_item(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let item = state.orchestrator.convert_item(&id).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(item)))
}

/// Health check endpoint (GET /api/health)
pub async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();

    // In v0 a component is healthy if the process is serving.
    // TODO: wire engine reachability into this once the daemon exposes a
    // health route.
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("ledger".to_string(), "healthy".to_string());
    components.insert("conversion_queue".to_string(), "healthy".to_string());
    components.insert("engine".to_string(), "healthy".to_string());

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    let response = super::models::HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

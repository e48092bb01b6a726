use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::{
    services::{
        add_item, convert_item, delete_item, get_item, health, list_items, pause_item,
        resume_item,
    },
    state::AppState,
    ws::items_socket,
};

/// Assemble the full router: item API, WebSocket feed, health, and static
/// serving of the media directory (HLS playlists and segments).
pub fn build_router(state: AppState) -> Router {
    let media_dir = state.config.server.media_dir.clone();

    Router::new()
        .route("/api/items", get(list_items).post(add_item))
        .route("/api/items/{id}", get(get_item).delete(delete_item))
        .route("/api/items/{id}/pause", post(pause_item))
        .route("/api/items/{id}/resume", post(resume_item))
        .route("/api/items/{id}/convert", post(convert_item))
        .route("/api/health", get(health))
        .route("/ws", get(items_socket))
        .nest_service("/media", ServeDir::new(media_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

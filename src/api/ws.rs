//! WebSocket feed pushing the full item list on a fixed interval.

use axum::{
    extract::{State, WebSocketUpgrade},
    extract::ws::{Message, WebSocket},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use super::state::AppState;

/// GET /ws — upgrade and start the periodic push loop.
pub async fn items_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| push_items(socket, state))
}

async fn push_items(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = tokio::time::interval(state.config.pipeline.ws_push_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let items = state.orchestrator.list_items().await;
                let payload = match serde_json::to_string(&items) {
                    Ok(payload) => payload,
                    Err(err) => {
                        debug!(%err, "Failed to serialize item list");
                        continue;
                    }
                };
                if sink.send(Message::Text(payload.into())).await.is_err() {
                    // Write failure means the client is gone.
                    debug!("WebSocket client disconnected");
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pings are answered by axum; other client messages
                    // are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

//! WebSocket upgrade for the chat endpoint.
//!
//! # Responsibilities
//! - Reserve a session slot (503 when the gateway is full)
//! - Capture cookie, authorization and query string for the handshake
//! - Complete the upgrade and hand the socket to a chat session
//!
//! # Design Decisions
//! - The runtime (config + backend client) is snapshotted here, once per
//!   connection
//! - Authorization happens after the upgrade; failures are reported as close
//!   codes, not HTTP statuses

use axum::{
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::chat::{AuthContext, Session};
use crate::http::server::AppState;

/// Upgrade handler mounted on the configured chat path.
pub async fn chat_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let runtime = state.runtime.load_full();

    let Some(guard) = state
        .tracker
        .try_track(runtime.config.listener.max_connections)
    else {
        tracing::warn!(
            active = state.tracker.active_count(),
            "Connection limit reached, rejecting upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let context = AuthContext::from_request(&headers, &uri);
    let shutdown = state.shutdown.subscribe();
    let max_message_size = runtime.config.chat.max_message_size;

    tracing::debug!(connection_id = %guard.id(), "Upgrading chat connection");
    let session = Session::new(guard, runtime, context, shutdown);

    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| session.run(socket))
}

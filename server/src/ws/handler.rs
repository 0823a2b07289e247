use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};

use crate::auth::{self, AuthError};
use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// WebSocket upgrade endpoint. The session credential comes from the `jwt` cookie (or a
/// Bearer header). Authentication runs before the upgrade: a failed check answers 401
/// and no socket is ever handed to the actor.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = auth::credential_from_headers(&headers) else {
        tracing::warn!("WebSocket handshake without credential");
        return AuthError::MissingCredential.into_response();
    };

    match auth::authenticate(&state.db, &state.jwt_secret, &token).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, user.id))
        }
        Err(err) => {
            tracing::warn!(error = %err, "WebSocket auth failed");
            err.into_response()
        }
    }
}

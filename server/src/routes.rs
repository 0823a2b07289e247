use axum::{
    extract::State,
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::rooms::crud as room_crud;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
///
/// Must be served with `into_make_service_with_connect_info::<SocketAddr>()`: the rate
/// limiter keys on the peer address.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on room mutations: 30 per minute per IP, bursts of 10
    // Uses PeerIpKeyExtractor which reads from ConnectInfo<SocketAddr>
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(2) // 1 token every 2 seconds
            .burst_size(10)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Spawn background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // Room mutations with rate limiting
    let room_write_routes = Router::new()
        .route("/api/rooms", post(room_crud::create_room))
        .route("/api/rooms/{id}", put(room_crud::update_room))
        .route("/api/rooms/{id}", delete(room_crud::delete_room))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Room reads (credential required, checked by the AuthUser extractor)
    let room_read_routes = Router::new()
        .route("/api/rooms", get(room_crud::list_rooms))
        .route("/api/rooms/{id}", get(room_crud::get_room))
        .route("/api/rooms/{id}/messages", get(room_crud::list_messages));

    // WebSocket endpoint (auth via session cookie, checked before upgrade)
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(room_write_routes)
        .merge(room_read_routes)
        .merge(ws_routes)
        .merge(health)
        .with_state(state)
}

/// Health check with the live connection count.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "connections": state.connections.total(),
    }))
}

//! Route definitions

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::handlers::{
    delivery_webhook, health, incoming_webhook, message_status, relay_send, send_and_sync,
};
use crate::middleware::auth::auth_middleware;
use crate::server::AppState;

/// Create the API router
pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/api/send-and-sync", post(send_and_sync))
        .route("/api/status/{message_id}", get(message_status))
        // CRM-initiated send
        .route("/webhooks/send-message", post(relay_send))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check
        .route("/health", get(health))
        // Provider webhooks
        .route("/webhooks/tallbob/incoming", post(incoming_webhook))
        .route("/webhooks/tallbob/delivery", post(delivery_webhook))
        .merge(protected)
}

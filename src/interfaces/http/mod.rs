//! HTTP surface: gateway callbacks and the store-admin status API.

mod admin;
mod callbacks;

use crate::application::Services;
use axum::{
    Json, Router,
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

pub use admin::{ApiError, StatusUpdateRequest};

/// Create the router with all endpoints.
pub fn create_router(services: Services) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payments/{provider}/callback", post(callbacks::handle_callback))
        .route("/stores/{store_id}/orders/{order_id}", get(admin::get_order))
        .route(
            "/stores/{store_id}/orders/{order_id}/status",
            patch(admin::update_status),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

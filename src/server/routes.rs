//! Router configuration for the web front end.

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index).post(handlers::submit))
        .route("/result/:request_id", get(handlers::result_page))
        .route("/api/queue/:request_id", get(handlers::queue_status))
        .route("/api/stats", get(handlers::api_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

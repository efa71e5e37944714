use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - REST API the chat frontend talks to
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Pipeline entry points
            .route("/generate", post(handlers::generate))
            .route("/execute", post(handlers::execute))
            // System status
            .route("/status", get(handlers::system_status)),
    )
}

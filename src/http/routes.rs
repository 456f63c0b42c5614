use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Chat queries
        .route("/chat/transcript", get(handlers::get_transcript))
        .route("/chat/status", get(handlers::get_status))
        // Chat controls
        .route("/chat/input", put(handlers::set_input))
        .route("/chat/submit", post(handlers::submit))
        .route("/chat/listen/toggle", post(handlers::toggle_listen))
        .route("/chat/mute/toggle", post(handlers::toggle_mute))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Call control
        .route(
            "/companions/:companion_id/call/start",
            post(handlers::start_call),
        )
        .route(
            "/companions/:companion_id/call/mute",
            post(handlers::toggle_mute),
        )
        .route(
            "/companions/:companion_id/call/end",
            post(handlers::end_call),
        )
        // Call queries
        .route(
            "/companions/:companion_id/call/status",
            get(handlers::call_status),
        )
        .route(
            "/companions/:companion_id/call/transcript",
            get(handlers::call_transcript),
        )
        // Session summaries
        .route("/companions", get(handlers::list_companions))
        .route("/sessions/recent", get(handlers::list_recent_sessions))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

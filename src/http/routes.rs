use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // Recorder pages may be served from another origin
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Answers
        .route(
            "/api/responses",
            post(handlers::upload_response).get(handlers::list_responses),
        )
        .route("/api/audio/:id", get(handlers::get_audio))
        .route("/api/transcribe", post(handlers::transcribe))
        .layer(middleware)
        .with_state(state)
}

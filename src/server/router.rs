use super::handlers;
use super::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Upper bound on one upload request.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index_page))
        .route("/ingest", post(handlers::ingest))
        .route("/query", get(handlers::query))
        .route("/query_with_context", get(handlers::query_with_context))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

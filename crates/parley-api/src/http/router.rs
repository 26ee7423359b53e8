//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::http::Request;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_observe::attrs::SPAN_HTTP_REQUEST;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Provider health
        .route("/providers/status", get(handlers::provider::provider_status))
        .route("/providers/recheck", post(handlers::provider::recheck_provider))
        .route("/providers/assistant", get(handlers::provider::assistant_status))
        // Conversation contexts
        .route("/contexts", get(handlers::context::list_contexts))
        .route("/contexts/cleanup", post(handlers::context::cleanup_contexts));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                tracing::info_span!(SPAN_HTTP_REQUEST, method = %req.method(), uri = %req.uri())
            }),
        )
        .with_state(state)
}

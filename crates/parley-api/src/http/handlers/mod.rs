//! HTTP request handlers for the REST API.

pub mod context;
pub mod provider;

use std::time::Instant;

use axum::Json;
use axum::extract::State;

use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/health - Liveness plus shutdown state.
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    let start = Instant::now();
    let shutting_down = state.orchestrator.is_shutting_down();
    Json(ApiResponse::success(
        serde_json::json!({
            "status": if shutting_down { "shutting_down" } else { "ok" },
            "version": env!("CARGO_PKG_VERSION"),
        }),
        start,
    ))
}

//! Conversation context endpoints.
//!
//! GET  /api/v1/contexts         - Cached owner -> context mappings with lock state.
//! POST /api/v1/contexts/cleanup - Drop contexts the provider no longer knows.

use std::time::Instant;

use axum::Json;
use axum::extract::State;

use parley_types::conversation::{ActiveContextStatus, CleanupReport};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

pub async fn list_contexts(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ActiveContextStatus>>> {
    let start = Instant::now();
    Json(ApiResponse::success(state.orchestrator.active_contexts_status(), start))
}

pub async fn cleanup_contexts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CleanupReport>>, AppError> {
    let start = Instant::now();
    if state.orchestrator.is_shutting_down() {
        return Err(AppError::Unavailable("service is shutting down".to_string()));
    }
    let report = state.orchestrator.cleanup_corrupted_contexts().await?;
    Ok(Json(ApiResponse::success(report, start)))
}

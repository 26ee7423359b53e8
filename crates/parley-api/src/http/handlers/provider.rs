//! Provider health endpoints.
//!
//! GET  /api/v1/providers/status  - Cached primary/fallback verdict.
//! POST /api/v1/providers/recheck - Probe the primary now.
//! GET  /api/v1/providers/assistant?id= - Assistant availability.

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use parley_types::provider::{AssistantStatus, ProviderStatus};

use crate::http::response::ApiResponse;
use crate::state::AppState;

pub async fn provider_status(State(state): State<AppState>) -> Json<ApiResponse<ProviderStatus>> {
    let start = Instant::now();
    Json(ApiResponse::success(state.orchestrator.provider_status(), start))
}

pub async fn recheck_provider(State(state): State<AppState>) -> Json<ApiResponse<ProviderStatus>> {
    let start = Instant::now();
    let available = state.orchestrator.force_health_recheck().await;
    tracing::info!(available, "primary endpoint rechecked via API");
    Json(ApiResponse::success(state.orchestrator.provider_status(), start))
}

#[derive(Debug, Deserialize)]
pub struct AssistantQuery {
    pub id: Option<String>,
}

pub async fn assistant_status(
    State(state): State<AppState>,
    Query(query): Query<AssistantQuery>,
) -> Json<ApiResponse<AssistantStatus>> {
    let start = Instant::now();
    let status = state.orchestrator.check_assistant_status(query.id.as_deref()).await;
    Json(ApiResponse::success(status, start))
}

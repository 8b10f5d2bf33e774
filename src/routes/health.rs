//! Liveness/readiness endpoint (SPEC_FULL.md `[AMBIENT] Runtime shape`).
//! No database in this core, so "health" means the source registry and
//! aggregator were constructed successfully and are reachable.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::router::RouterState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sources: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<Arc<RouterState>>) -> Json<HealthResponse> {
    let active_sources = state.registry.len();
    crate::metrics::active_sources(active_sources);
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_sources,
    })
}

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tribunal_db::store::ProposalFilter;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Which proposal store backend is configured.
    pub store_backend: &'static str,
    /// Whether the proposal store answered a read.
    pub store_healthy: bool,
    pub integration_enabled: bool,
}

/// GET /health -- returns service and store health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = match &state.pool {
        Some(pool) => tribunal_db::health_check(pool).await.is_ok(),
        None => state.store.list(&ProposalFilter::default()).await.is_ok(),
    };

    let status = if store_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store_backend: state.store.backend_name(),
        store_healthy,
        integration_enabled: state.pipeline.is_some(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

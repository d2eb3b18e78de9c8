//! Handlers for `/proposals/{id}/integration`.

use axum::extract::{Path, State};
use axum::Json;
use tribunal_core::error::CoreError;
use tribunal_core::types::EntityId;
use tribunal_pipeline::{IntegrationPipeline, IntegrationRun};

use super::proposals::load_proposal;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAuthority;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/proposals/{id}/integration
///
/// Stage-by-stage state of the proposal's integration run.
pub async fn get_integration(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<IntegrationRun>>> {
    let pipeline = pipeline(&state)?;
    let run = pipeline.status(id).await?.ok_or(AppError::Core(CoreError::NotFound {
        entity: "IntegrationRun",
        id,
    }))?;
    Ok(Json(DataResponse { data: run }))
}

/// POST /api/v1/proposals/{id}/integration/retry
///
/// Resume the run from its first unfinished stage. Returns the run as it
/// stands afterwards, failed or not.
pub async fn retry_integration(
    RequireAuthority(user): RequireAuthority,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<IntegrationRun>>> {
    let pipeline = pipeline(&state)?;
    let proposal = load_proposal(&state, id).await?;

    tracing::info!(proposal_id = %id, actor = %user.principal.email, "Integration retry requested");
    let run = pipeline.run(&proposal).await?;
    Ok(Json(DataResponse { data: run }))
}

fn pipeline(state: &AppState) -> AppResult<&IntegrationPipeline> {
    state
        .pipeline
        .as_deref()
        .ok_or(AppError::IntegrationDisabled)
}

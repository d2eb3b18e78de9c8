//! Handlers for `/proposals/{id}/blocks`.
//!
//! Block edits follow the same rules as field edits: the author while the
//! proposal is a draft, authority identities at any time.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tribunal_core::blocks::{self, NewBlock};
use tribunal_core::proposal::Proposal;
use tribunal_core::types::EntityId;
use tribunal_core::workflow;
use tribunal_events::bus::PROPOSAL_UPDATED;

use super::proposals::{load_proposal, publish};
use crate::error::AppResult;
use crate::extract::ApiJson;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body for `PUT /proposals/{id}/blocks/order`.
#[derive(Debug, Deserialize)]
pub struct ReorderBlocksRequest {
    pub block_ids: Vec<EntityId>,
}

/// POST /api/v1/proposals/{id}/blocks
pub async fn append_block(
    AuthUser { principal }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    ApiJson(input): ApiJson<NewBlock>,
) -> AppResult<(StatusCode, Json<DataResponse<Proposal>>)> {
    let current = load_proposal(&state, id).await?;
    let (next, block_id) = workflow::edit_blocks(
        &current,
        &principal,
        &state.resolver,
        Utc::now(),
        |content| blocks::append_block(content, input),
    )?;
    let saved = state.store.save(&next, Some(current.version)).await?;

    tracing::debug!(proposal_id = %id, block_id = %block_id, "Block appended");
    publish(&state, PROPOSAL_UPDATED, &saved, &principal);
    Ok((StatusCode::CREATED, Json(DataResponse { data: saved })))
}

/// DELETE /api/v1/proposals/{id}/blocks/{block_id}
pub async fn remove_block(
    AuthUser { principal }: AuthUser,
    State(state): State<AppState>,
    Path((id, block_id)): Path<(EntityId, EntityId)>,
) -> AppResult<Json<DataResponse<Proposal>>> {
    let current = load_proposal(&state, id).await?;
    let (next, ()) = workflow::edit_blocks(
        &current,
        &principal,
        &state.resolver,
        Utc::now(),
        |content| blocks::remove_block(content, block_id),
    )?;
    let saved = state.store.save(&next, Some(current.version)).await?;

    tracing::debug!(proposal_id = %id, block_id = %block_id, "Block removed");
    publish(&state, PROPOSAL_UPDATED, &saved, &principal);
    Ok(Json(DataResponse { data: saved }))
}

/// PUT /api/v1/proposals/{id}/blocks/order
pub async fn reorder_blocks(
    AuthUser { principal }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    ApiJson(input): ApiJson<ReorderBlocksRequest>,
) -> AppResult<Json<DataResponse<Proposal>>> {
    let current = load_proposal(&state, id).await?;
    let (next, ()) = workflow::edit_blocks(
        &current,
        &principal,
        &state.resolver,
        Utc::now(),
        |content| blocks::reorder_blocks(content, &input.block_ids),
    )?;
    let saved = state.store.save(&next, Some(current.version)).await?;

    publish(&state, PROPOSAL_UPDATED, &saved, &principal);
    Ok(Json(DataResponse { data: saved }))
}

//! Handlers for the `/proposals` resource.
//!
//! Every write follows the same shape: load the current record, run the
//! workflow transition against it, persist the result with the version that
//! was read, then announce the change on the event bus.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tribunal_core::error::CoreError;
use tribunal_core::permissions::{normalize_email, Principal};
use tribunal_core::proposal::{Proposal, ProposalPatch, ProposalStatus};
use tribunal_core::types::EntityId;
use tribunal_core::workflow::{self, ApprovalEffect, ProposalDraft};
use tribunal_db::store::{ProposalFilter, StoreError};
use tribunal_events::bus::{
    PROPOSAL_APPROVED, PROPOSAL_CREATED, PROPOSAL_DELETED, PROPOSAL_REJECTED,
    PROPOSAL_SUBMITTED, PROPOSAL_UPDATED,
};
use tribunal_events::PlatformEvent;

use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{RequireAuthority, RequireCreator};
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /proposals`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub author_id: Option<String>,
}

/// Body for `PATCH /proposals/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateProposalRequest {
    #[serde(flatten)]
    pub patch: ProposalPatch,
    /// Version the client last read. A mismatch fails with `VERSION_CONFLICT`.
    pub expected_version: Option<i64>,
}

/// Body for `POST /proposals/{id}/reject`.
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

/// GET /api/v1/proposals
pub async fn list_proposals(
    _user: AuthUser,
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> AppResult<Json<DataResponse<Vec<Proposal>>>> {
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<ProposalStatus>)
        .transpose()?;
    let filter = ProposalFilter {
        status,
        author_id: params.author_id.filter(|a| !a.is_empty()),
    };

    let proposals = state.store.list(&filter).await?;
    Ok(Json(DataResponse { data: proposals }))
}

/// GET /api/v1/proposals/{id}
pub async fn get_proposal(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Proposal>>> {
    let proposal = load_proposal(&state, id).await?;
    Ok(Json(DataResponse { data: proposal }))
}

/// POST /api/v1/proposals
///
/// Authority authors bypass review: the record is stored already approved.
/// Its approval effect is applied to the target before the record itself is
/// written, so a failed effect leaves nothing approved behind.
pub async fn create_proposal(
    RequireCreator(user): RequireCreator,
    State(state): State<AppState>,
    ApiJson(draft): ApiJson<ProposalDraft>,
) -> AppResult<(StatusCode, Json<DataResponse<Proposal>>)> {
    let record = workflow::create_proposal(draft, &user.principal, &state.resolver, Utc::now())?;

    if let Some(target_id) = record.target_proposal_id {
        let target = load_proposal(&state, target_id).await?;
        workflow::ensure_target_approved(&target)?;
    }
    if record.status == ProposalStatus::Approved {
        apply_approval_effect(&state, &record, &user.principal).await?;
    }

    let created = state.store.create(record).await?;
    tracing::info!(
        proposal_id = %created.id,
        actor = %user.principal.email,
        status = %created.status,
        category = %created.category,
        "Proposal created"
    );
    publish(&state, PROPOSAL_CREATED, &created, &user.principal);
    if created.status == ProposalStatus::Approved {
        publish(&state, PROPOSAL_APPROVED, &created, &user.principal);
    }

    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// PATCH /api/v1/proposals/{id}
pub async fn update_proposal(
    AuthUser { principal }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    ApiJson(input): ApiJson<UpdateProposalRequest>,
) -> AppResult<Json<DataResponse<Proposal>>> {
    let current = load_proposal(&state, id).await?;
    if let Some(expected) = input.expected_version {
        if expected != current.version {
            return Err(StoreError::VersionConflict {
                id,
                expected,
                actual: current.version,
            }
            .into());
        }
    }

    let next = workflow::edit(&current, &principal, &input.patch, &state.resolver, Utc::now())?;
    let saved = state.store.save(&next, Some(current.version)).await?;
    tracing::info!(proposal_id = %id, actor = %principal.email, version = saved.version, "Proposal updated");
    publish(&state, PROPOSAL_UPDATED, &saved, &principal);

    Ok(Json(DataResponse { data: saved }))
}

/// DELETE /api/v1/proposals/{id}
///
/// Idempotent: deleting a missing proposal is still 204.
pub async fn delete_proposal(
    AuthUser { principal }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<StatusCode> {
    let Some(current) = state.store.get(id).await? else {
        return Ok(StatusCode::NO_CONTENT);
    };
    workflow::ensure_can_delete(&current, &principal, &state.resolver)?;

    if state.store.delete(id).await? {
        tracing::info!(proposal_id = %id, actor = %principal.email, "Proposal deleted");
        publish(&state, PROPOSAL_DELETED, &current, &principal);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/proposals/{id}/submit
pub async fn submit_proposal(
    AuthUser { principal }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Proposal>>> {
    let current = load_proposal(&state, id).await?;
    let next = workflow::submit(&current, &principal, Utc::now())?;
    let saved = state.store.save(&next, Some(current.version)).await?;

    tracing::info!(proposal_id = %id, actor = %principal.email, "Proposal submitted for review");
    publish(&state, PROPOSAL_SUBMITTED, &saved, &principal);
    Ok(Json(DataResponse { data: saved }))
}

/// POST /api/v1/proposals/{id}/approve
///
/// The target of an administrative proposal is changed first. If that write
/// fails the proposal stays pending and the approval can simply be retried.
pub async fn approve_proposal(
    RequireAuthority(user): RequireAuthority,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
) -> AppResult<Json<DataResponse<Proposal>>> {
    let reviewer = &user.principal;
    let current = load_proposal(&state, id).await?;
    let next = workflow::approve(&current, reviewer, &state.resolver, Utc::now())?;

    apply_approval_effect(&state, &next, reviewer).await?;
    let saved = state.store.save(&next, Some(current.version)).await?;
    tracing::info!(proposal_id = %id, actor = %reviewer.email, "Proposal approved");

    publish(&state, PROPOSAL_APPROVED, &saved, reviewer);
    Ok(Json(DataResponse { data: saved }))
}

/// POST /api/v1/proposals/{id}/reject
pub async fn reject_proposal(
    RequireAuthority(user): RequireAuthority,
    State(state): State<AppState>,
    Path(id): Path<EntityId>,
    ApiJson(input): ApiJson<RejectRequest>,
) -> AppResult<Json<DataResponse<Proposal>>> {
    let reviewer = &user.principal;
    let current = load_proposal(&state, id).await?;
    let next = workflow::reject(&current, reviewer, &input.reason, &state.resolver, Utc::now())?;
    let saved = state.store.save(&next, Some(current.version)).await?;

    tracing::info!(proposal_id = %id, actor = %reviewer.email, "Proposal rejected");
    publish(&state, PROPOSAL_REJECTED, &saved, reviewer);
    Ok(Json(DataResponse { data: saved }))
}

/* --------------------------------------------------------------------------
Helpers
-------------------------------------------------------------------------- */

/// Load a proposal or fail with 404.
pub(crate) async fn load_proposal(state: &AppState, id: EntityId) -> AppResult<Proposal> {
    state
        .store
        .get(id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Proposal",
            id,
        }))
}

/// Announce a committed proposal write on the event bus.
pub(crate) fn publish(state: &AppState, event_type: &str, proposal: &Proposal, actor: &Principal) {
    let event = PlatformEvent::proposal(event_type, proposal.id)
        .with_actor(normalize_email(&actor.email))
        .with_payload(serde_json::json!({
            "status": proposal.status,
            "title": proposal.title,
            "category": proposal.category,
            "target_level": proposal.target_level,
            "version": proposal.version,
        }));
    state.event_bus.publish(event);
}

/// Carry out what approving an administrative proposal means for its target.
///
/// Safe to repeat: a replacement is rewritten with the same content, and a
/// target that is already gone counts as deleted.
async fn apply_approval_effect(
    state: &AppState,
    approved: &Proposal,
    actor: &Principal,
) -> AppResult<()> {
    match workflow::approval_effect(approved) {
        ApprovalEffect::Publish => {}
        ApprovalEffect::ReplaceTarget { target_id } => {
            let target = load_proposal(state, target_id).await?;
            let replaced = workflow::apply_replacement(&target, approved, Utc::now())?;
            let saved = state.store.save(&replaced, Some(target.version)).await?;
            tracing::info!(
                proposal_id = %approved.id,
                target_id = %target_id,
                "Approved edit applied to target"
            );
            publish(state, PROPOSAL_UPDATED, &saved, actor);
        }
        ApprovalEffect::DeleteTarget { target_id } => {
            let Some(target) = state.store.get(target_id).await? else {
                tracing::debug!(
                    proposal_id = %approved.id,
                    target_id = %target_id,
                    "Deletion target already removed"
                );
                return Ok(());
            };
            workflow::ensure_target_approved(&target)?;
            if state.store.delete(target_id).await? {
                tracing::info!(
                    proposal_id = %approved.id,
                    target_id = %target_id,
                    "Approved deletion removed target"
                );
                publish(state, PROPOSAL_DELETED, &target, actor);
            }
        }
    }
    Ok(())
}

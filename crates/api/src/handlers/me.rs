use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tribunal_core::permissions::{Capabilities, Principal};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// The caller as this service sees them.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub principal: Principal,
    pub capabilities: Capabilities,
    pub is_authority: bool,
}

/// GET /api/v1/me
pub async fn me(
    AuthUser { principal }: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<MeResponse>>> {
    let capabilities = state.resolver.capabilities(&principal);
    let is_authority = state.resolver.is_authority(&principal);
    Ok(Json(DataResponse {
        data: MeResponse {
            principal,
            capabilities,
            is_authority,
        },
    }))
}

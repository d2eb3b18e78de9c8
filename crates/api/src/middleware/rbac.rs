//! Capability extractors.
//!
//! Each extractor wraps [`AuthUser`] and rejects callers that lack the
//! capability. Finer checks (authorship, source state) stay in the workflow.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tribunal_core::error::CoreError;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires a configured authority identity. Rejects with 403 otherwise.
///
/// ```ignore
/// async fn approve(RequireAuthority(user): RequireAuthority) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireAuthority(pub AuthUser);

impl FromRequestParts<AppState> for RequireAuthority {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !state.resolver.is_authority(&user.principal) {
            return Err(AppError::Core(CoreError::Forbidden(
                "Authority identity required".into(),
            )));
        }
        Ok(RequireAuthority(user))
    }
}

/// Requires the right to author proposals: a high enough level, or authority.
pub struct RequireCreator(pub AuthUser);

impl FromRequestParts<AppState> for RequireCreator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !state.resolver.capabilities(&user.principal).create {
            return Err(AppError::Core(CoreError::Forbidden(format!(
                "Level {} may not create proposals (minimum {})",
                user.principal.level,
                state.resolver.config().min_create_level()
            ))));
        }
        Ok(RequireCreator(user))
    }
}

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tribunal_core::error::CoreError;
use tribunal_db::store::StoreError;
use tribunal_pipeline::PipelineError;

/// Application-level error type for HTTP handlers.
///
/// Wraps domain, store and pipeline errors and renders every one of them as
/// `{ "error": message, "code": CODE }`. Internal details are logged, never
/// returned.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A body or query string that could not be parsed.
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Integration pipeline is not configured")]
    IntegrationDisabled,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Malformed(rejection.body_text())
    }
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An internal error occurred";
const STORAGE_MESSAGE: &str = "Proposal storage is unavailable";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Store(err) => classify_store_error(err),
            AppError::Pipeline(err) => match err {
                PipelineError::NotApproved { .. } | PipelineError::NotPublishable { .. } => {
                    (StatusCode::CONFLICT, "INVALID_STATE", err.to_string())
                }
                PipelineError::AlreadyRunning(_) => {
                    (StatusCode::CONFLICT, "CONFLICT", err.to_string())
                }
                PipelineError::Recorder(e) => {
                    tracing::error!(error = %e, "Integration run recorder failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        STORAGE_MESSAGE.to_string(),
                    )
                }
            },
            AppError::Malformed(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::IntegrationDisabled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "INTEGRATION_DISABLED",
                self.to_string(),
            ),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(core: &CoreError) -> (StatusCode, &'static str, String) {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::InvalidState(msg) => (StatusCode::CONFLICT, "INVALID_STATE", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                INTERNAL_MESSAGE.to_string(),
            )
        }
    }
}

/// Classify a store error into an HTTP status, error code, and message.
///
/// - `NotFound` maps to 404.
/// - `VersionConflict` maps to 409 `VERSION_CONFLICT`; `Duplicate` to 409 `CONFLICT`.
/// - I/O, serialization, database and corruption failures map to 500
///   `STORAGE_ERROR` with a sanitized message.
fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Proposal with id {id} not found"),
        ),
        StoreError::VersionConflict { .. } => {
            (StatusCode::CONFLICT, "VERSION_CONFLICT", err.to_string())
        }
        StoreError::Duplicate(_) => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
        StoreError::Io(_)
        | StoreError::Serialization(_)
        | StoreError::Database(_)
        | StoreError::Corrupt(_) => {
            tracing::error!(error = %err, "Proposal store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                STORAGE_MESSAGE.to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tribunal_core::types::new_id;

    fn status_of(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_core_errors_map_to_http_status() {
        assert_eq!(
            status_of(CoreError::NotFound {
                entity: "Proposal",
                id: new_id()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(CoreError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::InvalidState("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(CoreError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(CoreError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(CoreError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_map_to_http_status() {
        let id = new_id();
        assert_eq!(
            status_of(StoreError::VersionConflict {
                id,
                expected: 1,
                actual: 2
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(StoreError::Duplicate(id)), StatusCode::CONFLICT);
        assert_eq!(status_of(StoreError::NotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(StoreError::Corrupt("truncated".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_conversions_keep_the_source_variant() {
        let id = new_id();
        assert_matches!(
            AppError::from(StoreError::NotFound(id)),
            AppError::Store(StoreError::NotFound(found)) if found == id
        );
        assert_matches!(
            AppError::from(PipelineError::AlreadyRunning(id)),
            AppError::Pipeline(PipelineError::AlreadyRunning(_))
        );
    }

    #[test]
    fn test_administrative_integration_is_invalid_state() {
        let err = PipelineError::NotPublishable {
            id: new_id(),
            category: tribunal_core::proposal::Category::EditApproved,
        };
        assert_eq!(status_of(err), StatusCode::CONFLICT);
    }

    #[test]
    fn test_integration_disabled_is_unavailable() {
        assert_eq!(
            AppError::IntegrationDisabled.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::{blocks, integration, proposals};
use crate::state::AppState;

/// Routes mounted at `/proposals`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(proposals::list_proposals).post(proposals::create_proposal),
        )
        .route(
            "/{id}",
            get(proposals::get_proposal)
                .patch(proposals::update_proposal)
                .delete(proposals::delete_proposal),
        )
        .route("/{id}/submit", post(proposals::submit_proposal))
        .route("/{id}/approve", post(proposals::approve_proposal))
        .route("/{id}/reject", post(proposals::reject_proposal))
        .route("/{id}/blocks", post(blocks::append_block))
        .route("/{id}/blocks/order", put(blocks::reorder_blocks))
        .route("/{id}/blocks/{block_id}", delete(blocks::remove_block))
        .route("/{id}/integration", get(integration::get_integration))
        .route(
            "/{id}/integration/retry",
            post(integration::retry_integration),
        )
}

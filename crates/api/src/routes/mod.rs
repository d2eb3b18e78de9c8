pub mod health;
pub mod proposals;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /me                                          principal + capabilities
///
/// /proposals                                   list, create
/// /proposals/{id}                              get, update, delete
/// /proposals/{id}/submit                       author submits (POST)
/// /proposals/{id}/approve                      authority approves (POST)
/// /proposals/{id}/reject                       authority rejects (POST)
/// /proposals/{id}/blocks                       append block (POST)
/// /proposals/{id}/blocks/order                 reorder blocks (PUT)
/// /proposals/{id}/blocks/{block_id}            remove block (DELETE)
/// /proposals/{id}/integration                  integration run status
/// /proposals/{id}/integration/retry            resume run (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(handlers::me::me))
        .nest("/proposals", proposals::router())
}

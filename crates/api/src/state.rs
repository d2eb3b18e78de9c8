use std::sync::Arc;

use tribunal_core::permissions::PermissionResolver;
use tribunal_db::store::ProposalStore;
use tribunal_db::DbPool;
use tribunal_events::EventBus;
use tribunal_pipeline::IntegrationPipeline;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything heavy sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The proposal store (JSON document or PostgreSQL).
    pub store: Arc<dyn ProposalStore>,
    pub config: Arc<ServerConfig>,
    pub resolver: Arc<PermissionResolver>,
    /// Bus every committed proposal write is announced on.
    pub event_bus: Arc<EventBus>,
    /// `None` when no content API is configured.
    pub pipeline: Option<Arc<IntegrationPipeline>>,
    /// Present only with the PostgreSQL backend.
    pub pool: Option<DbPool>,
}

//! Integration run row model.

use sqlx::FromRow;
use tribunal_core::types::{EntityId, Timestamp};

/// A row from the `integration_runs` table.
///
/// The stage breakdown lives in `run` as JSON so the pipeline crate owns its
/// shape.
#[derive(Debug, Clone, FromRow)]
pub struct IntegrationRunRow {
    pub proposal_id: EntityId,
    pub status: String,
    pub run: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

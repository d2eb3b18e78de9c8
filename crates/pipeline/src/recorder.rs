//! Persistence for [`IntegrationRun`] records.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tribunal_core::types::EntityId;
use tribunal_db::repositories::IntegrationRunRepo;
use tribunal_db::DbPool;

use crate::stage::IntegrationRun;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Run record could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait RunRecorder: Send + Sync {
    async fn load(&self, proposal_id: EntityId) -> Result<Option<IntegrationRun>, RecorderError>;

    /// Insert or replace the run for `run.proposal_id`.
    async fn save(&self, run: &IntegrationRun) -> Result<(), RecorderError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local recorder, used with the JSON store backend.
#[derive(Default)]
pub struct MemoryRunRecorder {
    runs: RwLock<HashMap<EntityId, IntegrationRun>>,
}

impl MemoryRunRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRecorder for MemoryRunRecorder {
    async fn load(&self, proposal_id: EntityId) -> Result<Option<IntegrationRun>, RecorderError> {
        Ok(self.runs.read().await.get(&proposal_id).cloned())
    }

    async fn save(&self, run: &IntegrationRun) -> Result<(), RecorderError> {
        self.runs.write().await.insert(run.proposal_id, run.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// Stores each run as JSONB in `integration_runs`.
pub struct PgRunRecorder {
    pool: DbPool,
}

impl PgRunRecorder {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRecorder for PgRunRecorder {
    async fn load(&self, proposal_id: EntityId) -> Result<Option<IntegrationRun>, RecorderError> {
        let row = IntegrationRunRepo::find_by_proposal(&self.pool, proposal_id).await?;
        row.map(|r| serde_json::from_value(r.run))
            .transpose()
            .map_err(RecorderError::from)
    }

    async fn save(&self, run: &IntegrationRun) -> Result<(), RecorderError> {
        let value = serde_json::to_value(run)?;
        IntegrationRunRepo::upsert(&self.pool, run.proposal_id, run.status.as_str(), &value).await?;
        Ok(())
    }
}

//! Repository for the `integration_runs` table.

use sqlx::PgPool;
use tribunal_core::types::EntityId;

use crate::models::integration_run::IntegrationRunRow;

/// Column list for integration_runs queries.
const COLUMNS: &str = "proposal_id, status, run, created_at, updated_at";

/// Provides upsert and lookup for per-proposal integration runs.
pub struct IntegrationRunRepo;

impl IntegrationRunRepo {
    /// Insert or replace the run record for a proposal.
    pub async fn upsert(
        pool: &PgPool,
        proposal_id: EntityId,
        status: &str,
        run: &serde_json::Value,
    ) -> Result<IntegrationRunRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO integration_runs (proposal_id, status, run)
             VALUES ($1, $2, $3)
             ON CONFLICT (proposal_id) DO UPDATE SET
                status = EXCLUDED.status,
                run = EXCLUDED.run,
                updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, IntegrationRunRow>(&query)
            .bind(proposal_id)
            .bind(status)
            .bind(run)
            .fetch_one(pool)
            .await
    }

    /// Find the run record for a proposal.
    pub async fn find_by_proposal(
        pool: &PgPool,
        proposal_id: EntityId,
    ) -> Result<Option<IntegrationRunRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM integration_runs WHERE proposal_id = $1");
        sqlx::query_as::<_, IntegrationRunRow>(&query)
            .bind(proposal_id)
            .fetch_optional(pool)
            .await
    }
}

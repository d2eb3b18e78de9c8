//! PostgreSQL-backed proposal store.

use async_trait::async_trait;
use chrono::Utc;
use tribunal_core::proposal::{Proposal, ProposalPatch};
use tribunal_core::types::{new_id, EntityId};

use super::{check_version, ProposalFilter, ProposalStore, StoreError};
use crate::repositories::ProposalRepo;
use crate::DbPool;

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

pub struct PgProposalStore {
    pool: DbPool,
}

impl PgProposalStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Explain why a conditional write matched no row.
    async fn missed_write(&self, id: EntityId, expected: Option<i64>) -> StoreError {
        match ProposalRepo::current_version(&self.pool, id).await {
            Ok(None) => StoreError::NotFound(id),
            Ok(Some(actual)) => match check_version(id, expected, actual) {
                Err(conflict) => conflict,
                // Row was concurrently replaced between the UPDATE and this read.
                Ok(()) => StoreError::VersionConflict {
                    id,
                    expected: expected.unwrap_or(actual),
                    actual,
                },
            },
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl ProposalStore for PgProposalStore {
    async fn create(&self, mut proposal: Proposal) -> Result<Proposal, StoreError> {
        if proposal.id.is_nil() {
            proposal.id = new_id();
        }
        let row = ProposalRepo::insert(&self.pool, &proposal)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                    StoreError::Duplicate(proposal.id)
                }
                _ => StoreError::Database(e),
            })?;
        row.try_into()
    }

    async fn get(&self, id: EntityId) -> Result<Option<Proposal>, StoreError> {
        ProposalRepo::find_by_id(&self.pool, id)
            .await?
            .map(Proposal::try_from)
            .transpose()
    }

    async fn update(
        &self,
        id: EntityId,
        patch: &ProposalPatch,
        expected_version: Option<i64>,
    ) -> Result<Proposal, StoreError> {
        let mut current = self.get(id).await?.ok_or(StoreError::NotFound(id))?;
        check_version(id, expected_version, current.version)?;

        current.apply_patch(patch);
        current.timestamps.updated_at = Utc::now();

        match ProposalRepo::replace(&self.pool, &current, expected_version).await? {
            Some(row) => row.try_into(),
            None => Err(self.missed_write(id, expected_version).await),
        }
    }

    async fn save(
        &self,
        proposal: &Proposal,
        expected_version: Option<i64>,
    ) -> Result<Proposal, StoreError> {
        match ProposalRepo::replace(&self.pool, proposal, expected_version).await? {
            Some(row) => row.try_into(),
            None => Err(self.missed_write(proposal.id, expected_version).await),
        }
    }

    async fn delete(&self, id: EntityId) -> Result<bool, StoreError> {
        Ok(ProposalRepo::delete(&self.pool, id).await?)
    }

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, StoreError> {
        let status = filter.status.map(|s| s.as_str());
        ProposalRepo::list(&self.pool, status, filter.author_id.as_deref())
            .await?
            .into_iter()
            .map(Proposal::try_from)
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

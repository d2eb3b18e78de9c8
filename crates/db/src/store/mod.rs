//! Proposal store abstraction.
//!
//! [`ProposalStore`] is the only owner of proposal records. Two backends
//! exist:
//!
//! - [`JsonFileStore`]: the whole collection as one JSON document on disk.
//! - [`PgProposalStore`]: one row per proposal in PostgreSQL.
//!
//! Both stamp a monotonic `version` on every write. Passing an
//! `expected_version` turns a silent lost update into
//! [`StoreError::VersionConflict`].

mod json_file;
mod postgres;

pub use json_file::JsonFileStore;
pub use postgres::PgProposalStore;

use async_trait::async_trait;
use serde::Deserialize;
use tribunal_core::proposal::{Proposal, ProposalPatch, ProposalStatus};
use tribunal_core::types::EntityId;

/// Errors raised by any store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize proposals: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("Proposal {0} already exists")]
    Duplicate(EntityId),

    #[error("Proposal {0} not found")]
    NotFound(EntityId),

    #[error("Version conflict on proposal {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: EntityId,
        expected: i64,
        actual: i64,
    },
}

/// Optional list filters. Results keep insertion order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalFilter {
    pub status: Option<ProposalStatus>,
    pub author_id: Option<String>,
}

impl ProposalFilter {
    pub fn matches(&self, p: &Proposal) -> bool {
        self.status.map_or(true, |s| p.status == s)
            && self
                .author_id
                .as_deref()
                .map_or(true, |a| p.author.id == a)
    }
}

/// Durable key-value collection of proposals.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Insert a new record. A nil id is replaced with a fresh one; the
    /// stored version always starts at 1.
    async fn create(&self, proposal: Proposal) -> Result<Proposal, StoreError>;

    async fn get(&self, id: EntityId) -> Result<Option<Proposal>, StoreError>;

    /// Merge the `Some` fields of `patch`, bumping `updated_at` and `version`.
    async fn update(
        &self,
        id: EntityId,
        patch: &ProposalPatch,
        expected_version: Option<i64>,
    ) -> Result<Proposal, StoreError>;

    /// Replace a whole record (after a workflow transition), bumping `version`.
    async fn save(
        &self,
        proposal: &Proposal,
        expected_version: Option<i64>,
    ) -> Result<Proposal, StoreError>;

    /// Remove a record. Missing ids are a no-op; returns whether one existed.
    async fn delete(&self, id: EntityId) -> Result<bool, StoreError>;

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, StoreError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Reject a write whose expected version no longer matches.
pub(crate) fn check_version(
    id: EntityId,
    expected: Option<i64>,
    actual: i64,
) -> Result<(), StoreError> {
    match expected {
        Some(expected) if expected != actual => Err(StoreError::VersionConflict {
            id,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

//! Single-document JSON store.
//!
//! The entire collection lives in one JSON array. Every operation reads the
//! whole file and every mutation rewrites it (temp file + rename). Within a
//! process, operations are serialized by a mutex; writers in other processes
//! are detected through record versions, not locks.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tribunal_core::proposal::{Proposal, ProposalPatch};
use tribunal_core::types::{new_id, EntityId};

use super::{check_version, ProposalFilter, ProposalStore, StoreError};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or lazily create) a store at `path`.
    ///
    /// The parent directory is created if needed, and an existing file is
    /// parsed once so corruption surfaces at startup.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let store = Self {
            path,
            lock: Mutex::new(()),
        };
        let existing = store.load().await?;
        tracing::info!(
            path = %store.path.display(),
            proposals = existing.len(),
            "Opened JSON proposal store"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Proposal>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "Proposal store is corrupt");
            StoreError::Corrupt(format!("{}: {e}", self.path.display()))
        })
    }

    async fn persist(&self, records: &[Proposal]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = %self.path.display(), proposals = records.len(), "Persisted proposals");
        Ok(())
    }
}

fn position(records: &[Proposal], id: EntityId) -> Result<usize, StoreError> {
    records
        .iter()
        .position(|p| p.id == id)
        .ok_or(StoreError::NotFound(id))
}

#[async_trait]
impl ProposalStore for JsonFileStore {
    async fn create(&self, mut proposal: Proposal) -> Result<Proposal, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        if proposal.id.is_nil() {
            proposal.id = new_id();
        }
        if records.iter().any(|p| p.id == proposal.id) {
            return Err(StoreError::Duplicate(proposal.id));
        }
        proposal.version = 1;

        records.push(proposal.clone());
        self.persist(&records).await?;
        Ok(proposal)
    }

    async fn get(&self, id: EntityId) -> Result<Option<Proposal>, StoreError> {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;
        Ok(records.into_iter().find(|p| p.id == id))
    }

    async fn update(
        &self,
        id: EntityId,
        patch: &ProposalPatch,
        expected_version: Option<i64>,
    ) -> Result<Proposal, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let index = position(&records, id)?;

        let record = &mut records[index];
        check_version(id, expected_version, record.version)?;
        record.apply_patch(patch);
        record.timestamps.updated_at = Utc::now();
        record.version += 1;
        let updated = record.clone();

        self.persist(&records).await?;
        Ok(updated)
    }

    async fn save(
        &self,
        proposal: &Proposal,
        expected_version: Option<i64>,
    ) -> Result<Proposal, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let index = position(&records, proposal.id)?;

        let stored_version = records[index].version;
        check_version(proposal.id, expected_version, stored_version)?;

        let mut next = proposal.clone();
        next.version = stored_version + 1;
        records[index] = next.clone();

        self.persist(&records).await?;
        Ok(next)
    }

    async fn delete(&self, id: EntityId) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|p| p.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.persist(&records).await?;
        Ok(true)
    }

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, StoreError> {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;
        Ok(records.into_iter().filter(|p| filter.matches(p)).collect())
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}

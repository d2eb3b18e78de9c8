//! Repository for the `proposals` table.

use sqlx::types::Json;
use sqlx::PgPool;
use tribunal_core::proposal::Proposal;
use tribunal_core::types::EntityId;

use crate::models::proposal::ProposalRow;

/// Column list for proposals queries.
const COLUMNS: &str = "id, seq, title, description, category, target_level, \
    target_proposal_id, content, author_id, author_name, author_email, author_level, \
    status, rejection_reason, approvals, rejections, version, \
    created_at, updated_at, submitted_at, approved_at, rejected_at";

/// Provides CRUD operations for proposals.
pub struct ProposalRepo;

impl ProposalRepo {
    /// Insert a new proposal at version 1, returning the created row.
    pub async fn insert(pool: &PgPool, p: &Proposal) -> Result<ProposalRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO proposals
                (id, title, description, category, target_level, target_proposal_id, content,
                 author_id, author_name, author_email, author_level, status, rejection_reason,
                 approvals, rejections, version, created_at, updated_at,
                 submitted_at, approved_at, rejected_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 1,
                     $16, $17, $18, $19, $20)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProposalRow>(&query)
            .bind(p.id)
            .bind(&p.title)
            .bind(&p.description)
            .bind(p.category.as_str())
            .bind(i16::from(p.target_level))
            .bind(p.target_proposal_id)
            .bind(Json(&p.content))
            .bind(&p.author.id)
            .bind(&p.author.name)
            .bind(&p.author.email)
            .bind(i16::from(p.author.level))
            .bind(p.status.as_str())
            .bind(&p.rejection_reason)
            .bind(&p.votes.approvals)
            .bind(&p.votes.rejections)
            .bind(p.timestamps.created_at)
            .bind(p.timestamps.updated_at)
            .bind(p.timestamps.submitted_at)
            .bind(p.timestamps.approved_at)
            .bind(p.timestamps.rejected_at)
            .fetch_one(pool)
            .await
    }

    /// Find a proposal by ID.
    pub async fn find_by_id(pool: &PgPool, id: EntityId) -> Result<Option<ProposalRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM proposals WHERE id = $1");
        sqlx::query_as::<_, ProposalRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List proposals in insertion order with optional status and author filters.
    pub async fn list(
        pool: &PgPool,
        status: Option<&str>,
        author_id: Option<&str>,
    ) -> Result<Vec<ProposalRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM proposals
             WHERE ($1::TEXT IS NULL OR status = $1)
               AND ($2::TEXT IS NULL OR author_id = $2)
             ORDER BY seq ASC"
        );
        sqlx::query_as::<_, ProposalRow>(&query)
            .bind(status)
            .bind(author_id)
            .fetch_all(pool)
            .await
    }

    /// Overwrite every mutable column and bump the version.
    ///
    /// When `expected_version` is set, the write only applies if the stored
    /// version still matches; `None` is returned if no row was updated.
    pub async fn replace(
        pool: &PgPool,
        p: &Proposal,
        expected_version: Option<i64>,
    ) -> Result<Option<ProposalRow>, sqlx::Error> {
        let query = format!(
            "UPDATE proposals SET
                title = $2,
                description = $3,
                category = $4,
                target_level = $5,
                target_proposal_id = $6,
                content = $7,
                status = $8,
                rejection_reason = $9,
                approvals = $10,
                rejections = $11,
                updated_at = $12,
                submitted_at = $13,
                approved_at = $14,
                rejected_at = $15,
                version = version + 1
             WHERE id = $1
               AND ($16::BIGINT IS NULL OR version = $16)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProposalRow>(&query)
            .bind(p.id)
            .bind(&p.title)
            .bind(&p.description)
            .bind(p.category.as_str())
            .bind(i16::from(p.target_level))
            .bind(p.target_proposal_id)
            .bind(Json(&p.content))
            .bind(p.status.as_str())
            .bind(&p.rejection_reason)
            .bind(&p.votes.approvals)
            .bind(&p.votes.rejections)
            .bind(p.timestamps.updated_at)
            .bind(p.timestamps.submitted_at)
            .bind(p.timestamps.approved_at)
            .bind(p.timestamps.rejected_at)
            .bind(expected_version)
            .fetch_optional(pool)
            .await
    }

    /// Current version of a proposal, if it exists.
    pub async fn current_version(pool: &PgPool, id: EntityId) -> Result<Option<i64>, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM proposals WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    /// Delete a proposal. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: EntityId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM proposals WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

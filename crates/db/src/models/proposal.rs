//! Proposal row model.

use sqlx::types::Json;
use sqlx::FromRow;
use tribunal_core::blocks::ContentBlock;
use tribunal_core::proposal::{
    AuthorSnapshot, Category, Proposal, ProposalStatus, ProposalTimestamps, Votes,
};
use tribunal_core::types::{EntityId, Timestamp};

use crate::store::StoreError;

/// A row from the `proposals` table.
#[derive(Debug, Clone, FromRow)]
pub struct ProposalRow {
    pub id: EntityId,
    pub seq: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub target_level: i16,
    pub target_proposal_id: Option<EntityId>,
    pub content: Json<Vec<ContentBlock>>,
    pub author_id: String,
    pub author_name: String,
    pub author_email: String,
    pub author_level: i16,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub approvals: Vec<String>,
    pub rejections: Vec<String>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
    pub approved_at: Option<Timestamp>,
    pub rejected_at: Option<Timestamp>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = StoreError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, detail: String| {
            StoreError::Corrupt(format!("proposal {} {field}: {detail}", row.id))
        };

        let category: Category = row
            .category
            .parse()
            .map_err(|e| corrupt("category", format!("{e}")))?;
        let status: ProposalStatus = row
            .status
            .parse()
            .map_err(|e| corrupt("status", format!("{e}")))?;
        let target_level = u8::try_from(row.target_level)
            .map_err(|e| corrupt("target_level", e.to_string()))?;
        let author_level = u8::try_from(row.author_level)
            .map_err(|e| corrupt("author_level", e.to_string()))?;

        Ok(Proposal {
            id: row.id,
            title: row.title,
            description: row.description,
            category,
            target_level,
            target_proposal_id: row.target_proposal_id,
            content: row.content.0,
            author: AuthorSnapshot {
                id: row.author_id,
                name: row.author_name,
                email: row.author_email,
                level: author_level,
            },
            status,
            timestamps: ProposalTimestamps {
                created_at: row.created_at,
                updated_at: row.updated_at,
                submitted_at: row.submitted_at,
                approved_at: row.approved_at,
                rejected_at: row.rejected_at,
            },
            rejection_reason: row.rejection_reason,
            votes: Votes {
                approvals: row.approvals,
                rejections: row.rejections,
            },
            version: row.version,
        })
    }
}

//! Proposal records, status and category enums, and field validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::blocks::ContentBlock;
use crate::error::CoreError;
use crate::permissions::Principal;
use crate::types::{EntityId, Timestamp};

/* --------------------------------------------------------------------------
Constants
-------------------------------------------------------------------------- */

/// Lowest audience tier.
pub const MIN_LEVEL: u8 = 1;

/// Highest audience tier.
pub const MAX_LEVEL: u8 = 6;

/// Maximum length for a proposal title.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length for a proposal description.
pub const MAX_DESCRIPTION_LENGTH: usize = 2_000;

/// Maximum length for a rejection reason.
pub const MAX_REJECTION_REASON_LENGTH: usize = 2_000;

/* --------------------------------------------------------------------------
Status
-------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 4] = [
        ProposalStatus::Draft,
        ProposalStatus::Pending,
        ProposalStatus::Approved,
        ProposalStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::Pending => "pending",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
        }
    }

    /// `approved` and `rejected` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ProposalStatus::Approved | ProposalStatus::Rejected)
    }

    /// Allowed transitions:
    /// - `draft`   -> `pending`
    /// - `pending` -> `approved`, `rejected`
    pub fn can_transition_to(self, next: ProposalStatus) -> bool {
        matches!(
            (self, next),
            (ProposalStatus::Draft, ProposalStatus::Pending)
                | (ProposalStatus::Pending, ProposalStatus::Approved)
                | (ProposalStatus::Pending, ProposalStatus::Rejected)
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown proposal status '{s}'")))
    }
}

/* --------------------------------------------------------------------------
Category
-------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Theoretical,
    Practical,
    Checkpoint,
    /// Replace the content of an already-approved proposal.
    EditApproved,
    /// Remove an already-approved proposal.
    DeleteApproved,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Theoretical,
        Category::Practical,
        Category::Checkpoint,
        Category::EditApproved,
        Category::DeleteApproved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Theoretical => "theoretical",
            Category::Practical => "practical",
            Category::Checkpoint => "checkpoint",
            Category::EditApproved => "edit_approved",
            Category::DeleteApproved => "delete_approved",
        }
    }

    /// Administrative variants act on another, already-approved proposal.
    pub fn is_administrative(self) -> bool {
        matches!(self, Category::EditApproved | Category::DeleteApproved)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown category '{s}'")))
    }
}

/* --------------------------------------------------------------------------
Record
-------------------------------------------------------------------------- */

/// Author identity captured when the proposal is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub id: String,
    pub name: String,
    pub email: String,
    pub level: u8,
}

impl From<&Principal> for AuthorSnapshot {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.user_id.clone(),
            name: p.display_name.clone(),
            email: p.email.trim().to_string(),
            level: p.level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalTimestamps {
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub submitted_at: Option<Timestamp>,
    #[serde(default)]
    pub approved_at: Option<Timestamp>,
    #[serde(default)]
    pub rejected_at: Option<Timestamp>,
}

impl ProposalTimestamps {
    pub fn created(now: Timestamp) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
        }
    }
}

/// Reviewer identities (normalized emails) that have acted on a proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Votes {
    #[serde(default)]
    pub approvals: Vec<String>,
    #[serde(default)]
    pub rejections: Vec<String>,
}

/// A unit of proposed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: EntityId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub target_level: u8,
    /// Set only for administrative categories.
    #[serde(default)]
    pub target_proposal_id: Option<EntityId>,
    pub content: Vec<ContentBlock>,
    pub author: AuthorSnapshot,
    pub status: ProposalStatus,
    pub timestamps: ProposalTimestamps,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub votes: Votes,
    /// Incremented by every store write.
    #[serde(default = "initial_version")]
    pub version: i64,
}

fn initial_version() -> i64 {
    1
}

impl Proposal {
    pub fn is_authored_by(&self, principal: &Principal) -> bool {
        self.author.id == principal.user_id
    }

    /// Apply the `Some` fields of a patch. Does not bump timestamps or version.
    pub fn apply_patch(&mut self, patch: &ProposalPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(level) = patch.target_level {
            self.target_level = level;
        }
        if let Some(target) = patch.target_proposal_id {
            self.target_proposal_id = target;
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
    }
}

/// Partial update of the editable proposal fields.
///
/// Status, votes and timestamps are only changed through the workflow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub target_level: Option<u8>,
    /// `Some(None)` clears the target.
    #[serde(default, with = "double_option")]
    pub target_proposal_id: Option<Option<EntityId>>,
    pub content: Option<Vec<ContentBlock>>,
}

impl ProposalPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.target_level.is_none()
            && self.target_proposal_id.is_none()
            && self.content.is_none()
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Deserialize::deserialize(de).map(Some)
    }
}

/* --------------------------------------------------------------------------
Validation functions
-------------------------------------------------------------------------- */

/// Validate that a level is within 1-6.
pub fn validate_level(level: u8) -> Result<(), CoreError> {
    if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid target level {level}. Must be between {MIN_LEVEL} and {MAX_LEVEL}"
        )))
    }
}

pub fn validate_title(title: &str) -> Result<(), CoreError> {
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(CoreError::Validation(format!(
            "Title exceeds maximum length of {MAX_TITLE_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), CoreError> {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(CoreError::Validation(format!(
            "Description exceeds maximum length of {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Administrative categories need a target; regular categories must not have one.
pub fn validate_category_target(
    category: Category,
    target: Option<EntityId>,
    own_id: Option<EntityId>,
) -> Result<(), CoreError> {
    match (category.is_administrative(), target) {
        (true, None) => Err(CoreError::Validation(format!(
            "Category '{category}' requires target_proposal_id"
        ))),
        (false, Some(_)) => Err(CoreError::Validation(format!(
            "Category '{category}' must not set target_proposal_id"
        ))),
        (true, Some(t)) if Some(t) == own_id => Err(CoreError::Validation(
            "A proposal cannot target itself".to_string(),
        )),
        _ => Ok(()),
    }
}

//! Approval state machine for proposals.
//!
//! ```text
//! draft --submit--> pending --approve--> approved
//!                           \--reject---> rejected
//! create (authority author) ----------> approved   (bypass)
//! ```
//!
//! Every transition borrows the current record and returns a new one, so a
//! failed transition can never leave a half-applied change behind. Checks run
//! in a fixed order: authorization, then source state, then field validation.
//!
//! A single authority approval or rejection is terminal; there is no quorum.

use serde::Deserialize;

use crate::blocks::{self, ContentBlock, NewBlock};
use crate::error::CoreError;
use crate::permissions::{normalize_email, PermissionResolver, Principal};
use crate::proposal::{
    self, AuthorSnapshot, Category, Proposal, ProposalPatch, ProposalStatus, ProposalTimestamps,
    Votes, MAX_REJECTION_REASON_LENGTH,
};
use crate::types::{new_id, EntityId, Timestamp};

/// Input for creating a proposal.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposalDraft {
    pub category: Category,
    pub target_level: u8,
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_proposal_id: Option<EntityId>,
    #[serde(default)]
    pub content: Vec<NewBlock>,
}

/// What approving a proposal means for the rest of the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalEffect {
    /// Regular content: hand it to downstream distribution.
    Publish,
    /// Replace the content of an approved target with this proposal's.
    ReplaceTarget { target_id: EntityId },
    /// Remove an approved target.
    DeleteTarget { target_id: EntityId },
}

/* --------------------------------------------------------------------------
Transitions
-------------------------------------------------------------------------- */

/// Build a new proposal for `author`.
///
/// Authority authors skip review entirely: the proposal is created already
/// `approved` with a self-vote.
pub fn create_proposal(
    draft: ProposalDraft,
    author: &Principal,
    resolver: &PermissionResolver,
    now: Timestamp,
) -> Result<Proposal, CoreError> {
    let authority = resolver.is_authority(author);
    if !authority && !resolver.can_create_proposals(author.level) {
        return Err(CoreError::Forbidden(format!(
            "Level {} may not create proposals (minimum {})",
            author.level,
            resolver.config().min_create_level()
        )));
    }

    proposal::validate_level(draft.target_level)?;
    proposal::validate_category_target(draft.category, draft.target_proposal_id, None)?;

    let content = blocks::build_blocks(draft.content);
    blocks::validate_blocks(&content)?;

    let (derived_title, derived_description) = blocks::extract_title_and_description(&content);
    let title = non_blank(draft.title)
        .or_else(|| derived_title.map(str::to_string))
        .unwrap_or_default();
    let description = non_blank(draft.description)
        .or_else(|| derived_description.map(str::to_string))
        .unwrap_or_default();
    proposal::validate_title(&title)?;
    proposal::validate_description(&description)?;

    let mut record = Proposal {
        id: new_id(),
        title,
        description,
        category: draft.category,
        target_level: draft.target_level,
        target_proposal_id: draft.target_proposal_id,
        content,
        author: AuthorSnapshot::from(author),
        status: ProposalStatus::Draft,
        timestamps: ProposalTimestamps::created(now),
        rejection_reason: None,
        votes: Votes::default(),
        version: 1,
    };

    if authority {
        let (title, description) = require_title_and_description(&record.content)?;
        record.title = title;
        record.description = description;
        record.status = ProposalStatus::Approved;
        record.votes.approvals.push(normalize_email(&author.email));
        record.timestamps.approved_at = Some(now);
    }

    Ok(record)
}

/// `draft -> pending`, by the author only.
pub fn submit(current: &Proposal, actor: &Principal, now: Timestamp) -> Result<Proposal, CoreError> {
    if !current.is_authored_by(actor) {
        return Err(CoreError::Forbidden(
            "Only the author may submit a proposal".to_string(),
        ));
    }
    ensure_transition(current, ProposalStatus::Pending, "submit")?;

    let (title, description) = require_title_and_description(&current.content)?;

    let mut next = current.clone();
    next.title = title;
    next.description = description;
    next.status = ProposalStatus::Pending;
    next.timestamps.submitted_at = Some(now);
    next.timestamps.updated_at = now;
    Ok(next)
}

/// `pending -> approved`, by an authority identity.
pub fn approve(
    current: &Proposal,
    reviewer: &Principal,
    resolver: &PermissionResolver,
    now: Timestamp,
) -> Result<Proposal, CoreError> {
    if !resolver.can_approve_proposals(&reviewer.email) && !resolver.is_authority(reviewer) {
        return Err(CoreError::Forbidden(
            "Only authority identities may approve proposals".to_string(),
        ));
    }
    ensure_transition(current, ProposalStatus::Approved, "approve")?;

    let mut next = current.clone();
    next.status = ProposalStatus::Approved;
    record_vote(&mut next.votes.approvals, &reviewer.email);
    next.timestamps.approved_at = Some(now);
    next.timestamps.updated_at = now;
    Ok(next)
}

/// `pending -> rejected`, by an authority identity, with a mandatory reason.
pub fn reject(
    current: &Proposal,
    reviewer: &Principal,
    reason: &str,
    resolver: &PermissionResolver,
    now: Timestamp,
) -> Result<Proposal, CoreError> {
    if !resolver.can_reject_proposals(&reviewer.email) && !resolver.is_authority(reviewer) {
        return Err(CoreError::Forbidden(
            "Only authority identities may reject proposals".to_string(),
        ));
    }
    ensure_transition(current, ProposalStatus::Rejected, "reject")?;

    if reason.trim().is_empty() {
        return Err(CoreError::Validation(
            "Missing field 'reason': a rejection reason is required".to_string(),
        ));
    }
    if reason.chars().count() > MAX_REJECTION_REASON_LENGTH {
        return Err(CoreError::Validation(format!(
            "Rejection reason exceeds maximum length of {MAX_REJECTION_REASON_LENGTH} characters"
        )));
    }

    let mut next = current.clone();
    next.status = ProposalStatus::Rejected;
    next.rejection_reason = Some(reason.to_string());
    record_vote(&mut next.votes.rejections, &reviewer.email);
    next.timestamps.rejected_at = Some(now);
    next.timestamps.updated_at = now;
    Ok(next)
}

/* --------------------------------------------------------------------------
Editing
-------------------------------------------------------------------------- */

/// Authors edit their own drafts; authority identities edit anything.
pub fn ensure_can_edit(
    current: &Proposal,
    actor: &Principal,
    resolver: &PermissionResolver,
) -> Result<(), CoreError> {
    if resolver.is_authority(actor) {
        return Ok(());
    }
    if !current.is_authored_by(actor) {
        return Err(CoreError::Forbidden(
            "Only the author may edit this proposal".to_string(),
        ));
    }
    if current.status != ProposalStatus::Draft {
        return Err(CoreError::InvalidState(format!(
            "Cannot edit a {} proposal",
            current.status
        )));
    }
    Ok(())
}

/// Same rule as editing.
pub fn ensure_can_delete(
    current: &Proposal,
    actor: &Principal,
    resolver: &PermissionResolver,
) -> Result<(), CoreError> {
    if resolver.is_authority(actor) {
        return Ok(());
    }
    if !current.is_authored_by(actor) {
        return Err(CoreError::Forbidden(
            "Only the author may delete this proposal".to_string(),
        ));
    }
    if current.status != ProposalStatus::Draft {
        return Err(CoreError::InvalidState(format!(
            "Cannot delete a {} proposal",
            current.status
        )));
    }
    Ok(())
}

/// Apply a field patch. Status is never touched.
pub fn edit(
    current: &Proposal,
    actor: &Principal,
    patch: &ProposalPatch,
    resolver: &PermissionResolver,
    now: Timestamp,
) -> Result<Proposal, CoreError> {
    ensure_can_edit(current, actor, resolver)?;
    if patch.is_empty() {
        return Err(CoreError::Validation(
            "Update must change at least one field".to_string(),
        ));
    }

    let mut next = current.clone();
    next.apply_patch(patch);
    if patch.content.is_some() {
        blocks::normalize_order(&mut next.content);
    }
    validate_record(&next)?;
    next.timestamps.updated_at = now;
    Ok(next)
}

/// Run a block mutation under the edit rules.
pub fn edit_blocks<T, F>(
    current: &Proposal,
    actor: &Principal,
    resolver: &PermissionResolver,
    now: Timestamp,
    mutate: F,
) -> Result<(Proposal, T), CoreError>
where
    F: FnOnce(&mut Vec<ContentBlock>) -> Result<T, CoreError>,
{
    ensure_can_edit(current, actor, resolver)?;
    let mut next = current.clone();
    let output = mutate(&mut next.content)?;
    blocks::validate_blocks(&next.content)?;
    next.timestamps.updated_at = now;
    Ok((next, output))
}

/* --------------------------------------------------------------------------
Administrative categories
-------------------------------------------------------------------------- */

pub fn approval_effect(approved: &Proposal) -> ApprovalEffect {
    match (approved.category, approved.target_proposal_id) {
        (Category::EditApproved, Some(target_id)) => ApprovalEffect::ReplaceTarget { target_id },
        (Category::DeleteApproved, Some(target_id)) => ApprovalEffect::DeleteTarget { target_id },
        _ => ApprovalEffect::Publish,
    }
}

/// Administrative proposals may only act on approved content.
pub fn ensure_target_approved(target: &Proposal) -> Result<(), CoreError> {
    if target.status != ProposalStatus::Approved {
        return Err(CoreError::InvalidState(format!(
            "Target proposal {} is {}, only approved content can be edited or deleted",
            target.id, target.status
        )));
    }
    Ok(())
}

/// Copy an approved edit proposal's content onto its target.
pub fn apply_replacement(
    target: &Proposal,
    source: &Proposal,
    now: Timestamp,
) -> Result<Proposal, CoreError> {
    ensure_target_approved(target)?;
    let mut next = target.clone();
    next.content = source.content.clone();
    next.title = source.title.clone();
    next.description = source.description.clone();
    next.timestamps.updated_at = now;
    Ok(next)
}

/* --------------------------------------------------------------------------
Helpers
-------------------------------------------------------------------------- */

/// Title and subtitle blocks are mandatory for anything that leaves draft.
pub fn require_title_and_description(
    content: &[ContentBlock],
) -> Result<(String, String), CoreError> {
    let (title, description) = blocks::extract_title_and_description(content);
    let title = title.ok_or_else(|| {
        CoreError::Validation(
            "Missing field 'title': add a heading block with text".to_string(),
        )
    })?;
    let description = description.ok_or_else(|| {
        CoreError::Validation(
            "Missing field 'subtitle': add a subheading block with text".to_string(),
        )
    })?;
    proposal::validate_title(title)?;
    proposal::validate_description(description)?;
    Ok((title.to_string(), description.to_string()))
}

fn ensure_transition(
    current: &Proposal,
    next: ProposalStatus,
    action: &str,
) -> Result<(), CoreError> {
    if current.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(CoreError::InvalidState(format!(
            "Cannot {action} proposal {} while it is {}",
            current.id, current.status
        )))
    }
}

fn record_vote(list: &mut Vec<String>, email: &str) {
    let email = normalize_email(email);
    if !list.contains(&email) {
        list.push(email);
    }
}

fn validate_record(p: &Proposal) -> Result<(), CoreError> {
    proposal::validate_level(p.target_level)?;
    proposal::validate_category_target(p.category, p.target_proposal_id, Some(p.id))?;
    proposal::validate_title(&p.title)?;
    proposal::validate_description(&p.description)?;
    blocks::validate_blocks(&p.content)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */

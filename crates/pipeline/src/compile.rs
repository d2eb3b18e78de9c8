//! Wire payloads for the content distribution endpoints.
//!
//! The submission body uses snake_case; the injection body uses camelCase,
//! matching what the content API expects for each endpoint.

use serde::{Deserialize, Serialize};
use tribunal_core::blocks::ContentBlock;
use tribunal_core::proposal::{Proposal, ProposalStatus};

use crate::error::PipelineError;

/// Where injected content lands on a dashboard.
pub const DEFAULT_INJECTION_POSITION: &str = "top";

/// Body of the content-submission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSubmission {
    pub title: String,
    pub subtitle: String,
    pub content: Vec<ContentBlock>,
    pub level: u8,
    pub category: String,
    pub is_published: bool,
    /// Author email.
    pub created_by: String,
}

/// Body of the content-injection request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInjection {
    pub content_id: String,
    pub target_level: u8,
    pub target_dashboard: String,
    pub injection_position: String,
    pub is_active: bool,
}

/// What the injection endpoint reported back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionReceipt {
    pub content_id: Option<String>,
    pub is_active: bool,
    /// Raw response body, kept for diagnosis.
    pub raw: serde_json::Value,
}

/// Build the submission payload for an approved proposal.
pub fn compile(proposal: &Proposal) -> Result<ContentSubmission, PipelineError> {
    if proposal.status != ProposalStatus::Approved {
        return Err(PipelineError::NotApproved {
            id: proposal.id,
            status: proposal.status,
        });
    }

    let mut content = proposal.content.clone();
    content.sort_by_key(|b| b.order);

    Ok(ContentSubmission {
        title: proposal.title.clone(),
        subtitle: proposal.description.clone(),
        content,
        level: proposal.target_level,
        category: proposal.category.as_str().to_string(),
        is_published: true,
        created_by: proposal.author.email.clone(),
    })
}

pub fn dashboard_for(level: u8) -> String {
    format!("level-{level}")
}

pub fn injection_for(content_id: &str, level: u8) -> ContentInjection {
    ContentInjection {
        content_id: content_id.to_string(),
        target_level: level,
        target_dashboard: dashboard_for(level),
        injection_position: DEFAULT_INJECTION_POSITION.to_string(),
        is_active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use serde_json::json;
    use tribunal_core::blocks::{build_blocks, BlockType, NewBlock};
    use tribunal_core::proposal::{AuthorSnapshot, Category, ProposalTimestamps, Votes};
    use tribunal_core::types::new_id;

    fn proposal(status: ProposalStatus) -> Proposal {
        let mut content = build_blocks(vec![
            NewBlock {
                block_type: BlockType::Heading,
                content: json!("Termodinamica"),
                metadata: None,
            },
            NewBlock {
                block_type: BlockType::Subheading,
                content: json!("Primera ley"),
                metadata: None,
            },
        ]);
        content.reverse();
        Proposal {
            id: new_id(),
            title: "Termodinamica".into(),
            description: "Primera ley".into(),
            category: Category::Theoretical,
            target_level: 4,
            target_proposal_id: None,
            content,
            author: AuthorSnapshot {
                id: "u-1".into(),
                name: "Autor".into(),
                email: "autor@tribunal.dev".into(),
                level: 5,
            },
            status,
            timestamps: ProposalTimestamps::created(Utc::now()),
            rejection_reason: None,
            votes: Votes::default(),
            version: 3,
        }
    }

    #[test]
    fn test_compile_builds_submission_in_block_order() {
        let submission = compile(&proposal(ProposalStatus::Approved)).unwrap();
        assert_eq!(submission.title, "Termodinamica");
        assert_eq!(submission.subtitle, "Primera ley");
        assert_eq!(submission.level, 4);
        assert_eq!(submission.category, "theoretical");
        assert!(submission.is_published);
        assert_eq!(submission.created_by, "autor@tribunal.dev");
        assert_eq!(submission.content[0].block_type, BlockType::Heading);
    }

    #[test]
    fn test_compile_refuses_unapproved() {
        let result = compile(&proposal(ProposalStatus::Pending));
        assert_matches!(
            result,
            Err(PipelineError::NotApproved { status: ProposalStatus::Pending, .. })
        );
    }

    #[test]
    fn test_injection_uses_camel_case_wire_names() {
        let value = serde_json::to_value(injection_for("c-42", 3)).unwrap();
        assert_eq!(
            value,
            json!({
                "contentId": "c-42",
                "targetLevel": 3,
                "targetDashboard": "level-3",
                "injectionPosition": "top",
                "isActive": true,
            })
        );
    }
}

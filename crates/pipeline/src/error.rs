use tribunal_core::proposal::{Category, ProposalStatus};
use tribunal_core::types::EntityId;

use crate::recorder::RecorderError;

/// Errors that stop a run before or outside stage execution.
///
/// Stage failures are not errors at this level; they are recorded on the
/// returned [`IntegrationRun`](crate::IntegrationRun).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Proposal {id} is {status}; only approved proposals are integrated")]
    NotApproved { id: EntityId, status: ProposalStatus },

    #[error("Proposal {id} is an administrative {category} proposal and is never published")]
    NotPublishable { id: EntityId, category: Category },

    #[error("Integration already running for proposal {0}")]
    AlreadyRunning(EntityId),

    #[error("Run record unavailable: {0}")]
    Recorder(#[from] RecorderError),
}

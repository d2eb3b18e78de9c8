//! Stage names, statuses, and the per-proposal run record.

use std::fmt;

use serde::{Deserialize, Serialize};
use tribunal_core::types::{EntityId, Timestamp};

use crate::compile::{ContentSubmission, InjectionReceipt};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Compile,
    Submit,
    Inject,
    Verify,
}

impl Stage {
    /// Execution order.
    pub const ALL: [Stage; 4] = [Stage::Compile, Stage::Submit, Stage::Inject, Stage::Verify];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Compile => "compile",
            Stage::Submit => "submit",
            Stage::Inject => "inject",
            Stage::Verify => "verify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
}

impl StageRecord {
    fn pending(stage: Stage) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            attempts: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Everything known about one proposal's integration.
///
/// Stage outputs (`submission`, `content_id`, `receipt`) are kept on the run
/// so a resumed run can pick up where the last one stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRun {
    pub proposal_id: EntityId,
    pub status: RunStatus,
    pub stages: Vec<StageRecord>,
    pub submission: Option<ContentSubmission>,
    /// Id assigned by the content-submission endpoint.
    pub content_id: Option<String>,
    pub receipt: Option<InjectionReceipt>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl IntegrationRun {
    pub fn new(proposal_id: EntityId, now: Timestamp) -> Self {
        Self {
            proposal_id,
            status: RunStatus::Pending,
            stages: Stage::ALL.into_iter().map(StageRecord::pending).collect(),
            submission: None,
            content_id: None,
            receipt: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    fn stage_mut(&mut self, stage: Stage) -> &mut StageRecord {
        if let Some(index) = self.stages.iter().position(|r| r.stage == stage) {
            return &mut self.stages[index];
        }
        self.stages.push(StageRecord::pending(stage));
        let last = self.stages.len() - 1;
        &mut self.stages[last]
    }

    pub fn is_succeeded(&self, stage: Stage) -> bool {
        self.stage(stage)
            .is_some_and(|r| r.status == StageStatus::Succeeded)
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub(crate) fn begin_attempt(&mut self, stage: Stage, now: Timestamp) {
        self.status = RunStatus::Running;
        self.updated_at = now;
        let record = self.stage_mut(stage);
        record.status = StageStatus::Running;
        record.attempts += 1;
        record.started_at.get_or_insert(now);
        record.finished_at = None;
    }

    pub(crate) fn succeed(&mut self, stage: Stage, now: Timestamp) {
        self.updated_at = now;
        let record = self.stage_mut(stage);
        record.status = StageStatus::Succeeded;
        record.last_error = None;
        record.finished_at = Some(now);
    }

    /// Record a failed attempt that will be retried.
    pub(crate) fn note_error(&mut self, stage: Stage, error: String, now: Timestamp) {
        self.updated_at = now;
        self.stage_mut(stage).last_error = Some(error);
    }

    pub(crate) fn fail(&mut self, stage: Stage, error: String, now: Timestamp) {
        self.status = RunStatus::Failed;
        self.updated_at = now;
        let record = self.stage_mut(stage);
        record.status = StageStatus::Failed;
        record.last_error = Some(error);
        record.finished_at = Some(now);
    }

    /// Put a stage back to pending so the next run executes it again.
    pub(crate) fn reopen(&mut self, stage: Stage, now: Timestamp) {
        self.updated_at = now;
        let record = self.stage_mut(stage);
        record.status = StageStatus::Pending;
        record.finished_at = None;
    }

    pub(crate) fn complete(&mut self, now: Timestamp) {
        self.status = RunStatus::Completed;
        self.updated_at = now;
    }
}

//! Runs the integration stages for approved proposals.
//!
//! Runs are resumable: stages already marked `succeeded` are skipped and
//! their outputs (submission payload, content id, receipt) are reused, so a
//! retried run never submits the same content twice. Only one run per
//! proposal may be in flight at a time.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tribunal_core::proposal::{Proposal, ProposalStatus};
use tribunal_core::types::EntityId;
use tribunal_core::workflow::{approval_effect, ApprovalEffect};
use tribunal_db::store::ProposalStore;
use tribunal_events::bus::{
    EventBus, PlatformEvent, INTEGRATION_COMPLETED, INTEGRATION_FAILED, PROPOSAL_APPROVED,
};

use crate::compile::{compile, injection_for};
use crate::error::PipelineError;
use crate::gateway::{ContentGateway, GatewayError};
use crate::recorder::RunRecorder;
use crate::stage::{IntegrationRun, Stage};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Exponential backoff for network stages.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per stage per run, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Next backoff delay, clamped to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }
}

// ---------------------------------------------------------------------------
// Stage failures
// ---------------------------------------------------------------------------

struct StageFailure {
    message: String,
    retryable: bool,
}

impl StageFailure {
    fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<GatewayError> for StageFailure {
    fn from(e: GatewayError) -> Self {
        Self {
            retryable: e.is_retryable(),
            message: e.to_string(),
        }
    }
}

/// Marks a proposal as in flight for the guard's lifetime.
struct InFlightGuard<'a> {
    ids: &'a Mutex<HashSet<EntityId>>,
    id: EntityId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(ids: &'a Mutex<HashSet<EntityId>>, id: EntityId) -> Result<Self, PipelineError> {
        let mut set = ids.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(id) {
            return Err(PipelineError::AlreadyRunning(id));
        }
        Ok(Self { ids, id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// IntegrationPipeline
// ---------------------------------------------------------------------------

pub struct IntegrationPipeline {
    gateway: Arc<dyn ContentGateway>,
    recorder: Arc<dyn RunRecorder>,
    retry: RetryPolicy,
    bus: Option<Arc<EventBus>>,
    in_flight: Mutex<HashSet<EntityId>>,
    tracker: TaskTracker,
}

impl IntegrationPipeline {
    pub fn new(gateway: Arc<dyn ContentGateway>, recorder: Arc<dyn RunRecorder>) -> Self {
        Self {
            gateway,
            recorder,
            retry: RetryPolicy::default(),
            bus: None,
            in_flight: Mutex::new(HashSet::new()),
            tracker: TaskTracker::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Publish `integration.*` outcomes on this bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// The recorded run for a proposal, if any.
    pub async fn status(&self, proposal_id: EntityId) -> Result<Option<IntegrationRun>, PipelineError> {
        Ok(self.recorder.load(proposal_id).await?)
    }

    /// Run (or resume) the integration of an approved proposal.
    ///
    /// Stage failures are recorded on the returned run with
    /// [`RunStatus::Failed`](crate::RunStatus::Failed); `Err` is reserved for
    /// precondition and recorder failures.
    pub async fn run(&self, proposal: &Proposal) -> Result<IntegrationRun, PipelineError> {
        if proposal.status != ProposalStatus::Approved {
            return Err(PipelineError::NotApproved {
                id: proposal.id,
                status: proposal.status,
            });
        }
        if approval_effect(proposal) != ApprovalEffect::Publish {
            return Err(PipelineError::NotPublishable {
                id: proposal.id,
                category: proposal.category,
            });
        }
        let _guard = InFlightGuard::acquire(&self.in_flight, proposal.id)?;

        let mut run = match self.recorder.load(proposal.id).await? {
            Some(run) => run,
            None => IntegrationRun::new(proposal.id, Utc::now()),
        };
        if run.is_complete() {
            tracing::debug!(proposal_id = %proposal.id, "Integration already completed");
            return Ok(run);
        }

        for stage in Stage::ALL {
            if run.is_succeeded(stage) {
                tracing::debug!(proposal_id = %proposal.id, stage = %stage, "Skipping completed stage");
                continue;
            }
            if !self.execute(&mut run, proposal, stage).await? {
                self.announce_failure(&run, stage);
                return Ok(run);
            }
        }

        run.complete(Utc::now());
        self.recorder.save(&run).await?;
        tracing::info!(
            proposal_id = %proposal.id,
            content_id = run.content_id.as_deref().unwrap_or_default(),
            "Integration completed"
        );
        self.publish(
            PlatformEvent::proposal(INTEGRATION_COMPLETED, proposal.id)
                .with_payload(serde_json::json!({ "content_id": run.content_id })),
        );
        Ok(run)
    }

    /// Execute one stage with retries. Returns `false` once the stage has
    /// been recorded as failed.
    async fn execute(
        &self,
        run: &mut IntegrationRun,
        proposal: &Proposal,
        stage: Stage,
    ) -> Result<bool, PipelineError> {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            run.begin_attempt(stage, Utc::now());
            self.recorder.save(run).await?;

            match self.perform(run, proposal, stage).await {
                Ok(()) => {
                    run.succeed(stage, Utc::now());
                    self.recorder.save(run).await?;
                    tracing::info!(proposal_id = %proposal.id, stage = %stage, attempt, "Integration stage succeeded");
                    return Ok(true);
                }
                Err(failure) if failure.retryable && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        proposal_id = %proposal.id,
                        stage = %stage,
                        attempt,
                        error = %failure.message,
                        "Integration stage failed, retrying"
                    );
                    run.note_error(stage, failure.message, Utc::now());
                    self.recorder.save(run).await?;
                    tokio::time::sleep(delay).await;
                    delay = self.retry.next_delay(delay);
                }
                Err(failure) => {
                    tracing::error!(
                        proposal_id = %proposal.id,
                        stage = %stage,
                        attempt,
                        error = %failure.message,
                        "Integration stage failed"
                    );
                    run.fail(stage, failure.message, Utc::now());
                    if stage == Stage::Verify {
                        // The receipt is stale; the next run re-injects the same content id.
                        run.reopen(Stage::Inject, Utc::now());
                        run.receipt = None;
                    }
                    self.recorder.save(run).await?;
                    return Ok(false);
                }
            }
        }
    }

    async fn perform(
        &self,
        run: &mut IntegrationRun,
        proposal: &Proposal,
        stage: Stage,
    ) -> Result<(), StageFailure> {
        match stage {
            Stage::Compile => {
                let submission = compile(proposal).map_err(|e| StageFailure::fatal(e.to_string()))?;
                run.submission = Some(submission);
            }
            Stage::Submit => {
                if run.content_id.is_some() {
                    return Ok(());
                }
                let submission = run
                    .submission
                    .as_ref()
                    .ok_or_else(|| StageFailure::fatal("compiled submission is missing"))?;
                let content_id = self.gateway.submit_content(submission).await?;
                run.content_id = Some(content_id);
            }
            Stage::Inject => {
                let content_id = run
                    .content_id
                    .as_deref()
                    .ok_or_else(|| StageFailure::fatal("content id is missing"))?;
                let injection = injection_for(content_id, proposal.target_level);
                let receipt = self.gateway.inject_content(&injection).await?;
                run.receipt = Some(receipt);
            }
            Stage::Verify => {
                let (Some(content_id), Some(receipt)) = (run.content_id.as_deref(), run.receipt.as_ref())
                else {
                    return Err(StageFailure::fatal("nothing to verify"));
                };
                if receipt.content_id.as_deref() != Some(content_id) {
                    return Err(StageFailure::fatal(format!(
                        "injection receipt refers to {:?}, expected {content_id}",
                        receipt.content_id
                    )));
                }
                if !receipt.is_active {
                    return Err(StageFailure::fatal("injected content is not active"));
                }
            }
        }
        Ok(())
    }

    fn announce_failure(&self, run: &IntegrationRun, stage: Stage) {
        let error = run.stage(stage).and_then(|r| r.last_error.clone());
        self.publish(
            PlatformEvent::proposal(INTEGRATION_FAILED, run.proposal_id)
                .with_payload(serde_json::json!({ "stage": stage, "error": error })),
        );
    }

    fn publish(&self, event: PlatformEvent) {
        if let Some(bus) = &self.bus {
            bus.publish(event);
        }
    }

    // ---- listener ----

    /// Integrate every proposal announced as approved on the bus.
    ///
    /// Runs until the bus closes or `cancel` fires, then waits for in-flight
    /// runs to finish.
    pub async fn listen(
        self: Arc<Self>,
        store: Arc<dyn ProposalStore>,
        mut receiver: broadcast::Receiver<PlatformEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!("Integration pipeline listening for approvals");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Integration pipeline cancelled");
                    break;
                }
                received = receiver.recv() => match received {
                    Ok(event) if event.event_type == PROPOSAL_APPROVED => {
                        let Some(id) = event.source_entity_id else { continue };
                        let pipeline = Arc::clone(&self);
                        let store = Arc::clone(&store);
                        self.tracker.spawn(async move {
                            pipeline.integrate_approved(store.as_ref(), id).await;
                        });
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Integration pipeline lagged, approvals were missed");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, integration pipeline shutting down");
                        break;
                    }
                },
            }
        }

        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn integrate_approved(&self, store: &dyn ProposalStore, id: EntityId) {
        let proposal = match store.get(id).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                tracing::warn!(proposal_id = %id, "Approved proposal vanished before integration");
                return;
            }
            Err(e) => {
                tracing::error!(proposal_id = %id, error = %e, "Failed to load approved proposal");
                return;
            }
        };
        match self.run(&proposal).await {
            Ok(run) => {
                tracing::debug!(proposal_id = %id, status = run.status.as_str(), "Integration run finished");
            }
            Err(PipelineError::NotPublishable { category, .. }) => {
                tracing::debug!(proposal_id = %id, category = %category, "Administrative proposal, not integrated");
            }
            Err(PipelineError::AlreadyRunning(_)) => {
                tracing::debug!(proposal_id = %id, "Integration already in flight");
            }
            Err(e) => {
                tracing::error!(proposal_id = %id, error = %e, "Integration run aborted");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;
    use tribunal_core::blocks::{build_blocks, BlockType, NewBlock};
    use tribunal_core::proposal::{AuthorSnapshot, Category, ProposalTimestamps, Votes};
    use tribunal_core::types::new_id;
    use tribunal_db::store::JsonFileStore;

    use crate::compile::{ContentInjection, ContentSubmission, InjectionReceipt};
    use crate::recorder::MemoryRunRecorder;
    use crate::stage::{RunStatus, StageStatus};

    #[derive(Default)]
    struct FakeGateway {
        submit_calls: AtomicU32,
        inject_calls: AtomicU32,
        /// Remaining inject calls that answer 503.
        inject_failures: AtomicU32,
        reject_submissions: AtomicBool,
        inactive_receipts: AtomicBool,
    }

    #[async_trait]
    impl ContentGateway for FakeGateway {
        async fn submit_content(&self, _submission: &ContentSubmission) -> Result<String, GatewayError> {
            let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject_submissions.load(Ordering::SeqCst) {
                return Err(GatewayError::Api {
                    status: 422,
                    body: "invalid".into(),
                });
            }
            Ok(format!("c-{n}"))
        }

        async fn inject_content(
            &self,
            injection: &ContentInjection,
        ) -> Result<InjectionReceipt, GatewayError> {
            self.inject_calls.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .inject_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(GatewayError::Api {
                    status: 503,
                    body: "busy".into(),
                });
            }
            Ok(InjectionReceipt {
                content_id: Some(injection.content_id.clone()),
                is_active: !self.inactive_receipts.load(Ordering::SeqCst),
                raw: json!({}),
            })
        }
    }

    fn approved() -> Proposal {
        let now = Utc::now();
        let mut timestamps = ProposalTimestamps::created(now);
        timestamps.submitted_at = Some(now);
        timestamps.approved_at = Some(now);
        Proposal {
            id: new_id(),
            title: "Electrostatica".into(),
            description: "Ley de Coulomb".into(),
            category: Category::Practical,
            target_level: 2,
            target_proposal_id: None,
            content: build_blocks(vec![
                NewBlock {
                    block_type: BlockType::Heading,
                    content: json!("Electrostatica"),
                    metadata: None,
                },
                NewBlock {
                    block_type: BlockType::Subheading,
                    content: json!("Ley de Coulomb"),
                    metadata: None,
                },
            ]),
            author: AuthorSnapshot {
                id: "u-1".into(),
                name: "Autor".into(),
                email: "autor@tribunal.dev".into(),
                level: 5,
            },
            status: ProposalStatus::Approved,
            timestamps,
            rejection_reason: None,
            votes: Votes {
                approvals: vec!["nihilus@tribunal.dev".into()],
                rejections: Vec::new(),
            },
            version: 3,
        }
    }

    fn pipeline(gateway: Arc<FakeGateway>, attempts: u32) -> IntegrationPipeline {
        IntegrationPipeline::new(gateway, Arc::new(MemoryRunRecorder::new()))
            .with_retry_policy(RetryPolicy::immediate(attempts))
    }

    #[test]
    fn test_next_delay_doubles_and_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(policy.next_delay(Duration::from_secs(6)), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_happy_path_runs_every_stage_once() {
        let gateway = Arc::new(FakeGateway::default());
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let pipeline = pipeline(Arc::clone(&gateway), 3).with_event_bus(bus);
        let proposal = approved();

        let run = pipeline.run(&proposal).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.content_id.as_deref(), Some("c-1"));
        assert!(run
            .stages
            .iter()
            .all(|r| r.status == StageStatus::Succeeded && r.attempts == 1));
        assert_eq!(gateway.submit_calls.load(Ordering::SeqCst), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, INTEGRATION_COMPLETED);
        assert_eq!(event.source_entity_id, Some(proposal.id));
        assert_eq!(event.payload["content_id"], "c-1");

        let stored = pipeline.status(proposal.id).await.unwrap().unwrap();
        assert_eq!(stored, run);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.inject_failures.store(2, Ordering::SeqCst);
        let pipeline = pipeline(Arc::clone(&gateway), 3);

        let run = pipeline.run(&approved()).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.stage(Stage::Inject).unwrap().attempts, 3);
        assert_eq!(gateway.inject_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resume_skips_succeeded_stages_and_never_resubmits() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.inject_failures.store(10, Ordering::SeqCst);
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let pipeline = pipeline(Arc::clone(&gateway), 2).with_event_bus(bus);
        let proposal = approved();

        let failed = pipeline.run(&proposal).await.unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.content_id.as_deref(), Some("c-1"));
        let inject = failed.stage(Stage::Inject).unwrap();
        assert_eq!(inject.status, StageStatus::Failed);
        assert!(inject.last_error.as_deref().unwrap().contains("503"));
        assert_eq!(rx.recv().await.unwrap().event_type, INTEGRATION_FAILED);

        gateway.inject_failures.store(0, Ordering::SeqCst);
        let resumed = pipeline.run(&proposal).await.unwrap();
        assert_eq!(resumed.status, RunStatus::Completed);
        assert_eq!(resumed.content_id.as_deref(), Some("c-1"));
        assert_eq!(gateway.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resumed.stage(Stage::Submit).unwrap().attempts, 1);
        assert_eq!(resumed.stage(Stage::Inject).unwrap().attempts, 3);
    }

    #[tokio::test]
    async fn test_client_errors_fail_without_retry() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.reject_submissions.store(true, Ordering::SeqCst);
        let pipeline = pipeline(Arc::clone(&gateway), 5);

        let run = pipeline.run(&approved()).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.stage(Stage::Submit).unwrap().attempts, 1);
        assert_eq!(run.stage(Stage::Inject).unwrap().status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn test_inactive_receipt_fails_verification() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.inactive_receipts.store(true, Ordering::SeqCst);
        let pipeline = pipeline(Arc::clone(&gateway), 3);

        let run = pipeline.run(&approved()).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let verify = run.stage(Stage::Verify).unwrap();
        assert_eq!(verify.status, StageStatus::Failed);
        assert_eq!(verify.last_error.as_deref(), Some("injected content is not active"));
    }

    #[tokio::test]
    async fn test_failed_verification_reinjects_on_retry() {
        let gateway = Arc::new(FakeGateway::default());
        gateway.inactive_receipts.store(true, Ordering::SeqCst);
        let pipeline = pipeline(Arc::clone(&gateway), 3);
        let proposal = approved();

        let failed = pipeline.run(&proposal).await.unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.stage(Stage::Inject).unwrap().status, StageStatus::Pending);
        assert!(failed.receipt.is_none());

        gateway.inactive_receipts.store(false, Ordering::SeqCst);
        let resumed = pipeline.run(&proposal).await.unwrap();
        assert_eq!(resumed.status, RunStatus::Completed);
        assert_eq!(resumed.content_id.as_deref(), Some("c-1"));
        assert!(resumed.receipt.as_ref().unwrap().is_active);
        assert_eq!(gateway.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.inject_calls.load(Ordering::SeqCst), 2);
        assert_eq!(resumed.stage(Stage::Verify).unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_administrative_proposals_are_not_published() {
        let gateway = Arc::new(FakeGateway::default());
        let pipeline = pipeline(Arc::clone(&gateway), 3);
        let mut proposal = approved();
        proposal.category = Category::DeleteApproved;
        proposal.target_proposal_id = Some(new_id());

        assert_matches!(
            pipeline.run(&proposal).await,
            Err(PipelineError::NotPublishable { category: Category::DeleteApproved, .. })
        );
        assert_eq!(gateway.submit_calls.load(Ordering::SeqCst), 0);
        assert!(pipeline.status(proposal.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_run_is_not_repeated() {
        let gateway = Arc::new(FakeGateway::default());
        let pipeline = pipeline(Arc::clone(&gateway), 3);
        let proposal = approved();

        pipeline.run(&proposal).await.unwrap();
        let again = pipeline.run(&proposal).await.unwrap();
        assert!(again.is_complete());
        assert_eq!(gateway.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.inject_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unapproved_proposal_is_refused() {
        let pipeline = pipeline(Arc::new(FakeGateway::default()), 3);
        let mut proposal = approved();
        proposal.status = ProposalStatus::Pending;

        assert_matches!(
            pipeline.run(&proposal).await,
            Err(PipelineError::NotApproved { .. })
        );
        assert!(pipeline.status(proposal.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listener_integrates_approved_proposals() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ProposalStore> =
            Arc::new(JsonFileStore::open(dir.path().join("p.json")).await.unwrap());
        let proposal = store.create(approved()).await.unwrap();

        let gateway = Arc::new(FakeGateway::default());
        let pipeline = Arc::new(pipeline(Arc::clone(&gateway), 3));
        let bus = EventBus::default();
        let handle = tokio::spawn(Arc::clone(&pipeline).listen(
            Arc::clone(&store),
            bus.subscribe(),
            CancellationToken::new(),
        ));

        bus.publish(PlatformEvent::proposal(PROPOSAL_APPROVED, proposal.id));
        drop(bus);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("listener should drain and stop")
            .unwrap();

        let run = pipeline.status(proposal.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(gateway.submit_calls.load(Ordering::SeqCst), 1);
    }
}

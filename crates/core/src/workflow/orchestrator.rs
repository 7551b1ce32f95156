//! # Workflow Orchestrator
//!
//! Drives the four stages of one session in order, emits an event per step,
//! then suspends at the approval checkpoint until a decision arrives or the
//! timeout elapses.
//!
//! An orchestrator runs exactly once. Re-running a session means building a
//! new orchestrator.

use anyhow::Context;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::PlannerConfig;
use crate::error::{PlannerError, Result};
use crate::models::WorkflowRequest;
use crate::plan::HumanApprovalRequest;
use crate::stages::{prompts, PriorOutput, StageInput, StageResult, StageSet};

use super::approval::ApprovalGate;
use super::events::{ToolUse, WorkflowEvent};
use super::pipeline::{Pipeline, StageId, WorkflowState};
use super::telemetry::{TelemetryAggregator, TelemetryMetrics};

/// Message carried by the error event when nobody decides in time
pub const APPROVAL_TIMEOUT_MESSAGE: &str = "Approval timeout - plan expired";

/// Runtime knobs of an orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub approval_timeout: Duration,
    /// Cosmetic pause between stages; zero disables it
    pub stage_pause: Duration,
    pub event_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&PlannerConfig::default())
    }
}

impl From<&PlannerConfig> for OrchestratorConfig {
    fn from(config: &PlannerConfig) -> Self {
        Self {
            approval_timeout: config.approval_timeout(),
            stage_pause: config.stage_pause(),
            event_buffer: config.event_buffer.max(1),
        }
    }
}

pub struct Orchestrator {
    session_id: String,
    stages: Arc<StageSet>,
    config: OrchestratorConfig,
    pipeline: Mutex<Pipeline>,
    telemetry: TelemetryAggregator,
    gate: ApprovalGate,
    started: AtomicBool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        session_id: impl Into<String>,
        stages: Arc<StageSet>,
        config: OrchestratorConfig,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            telemetry: TelemetryAggregator::new(session_id.clone()),
            session_id,
            stages,
            config,
            pipeline: Mutex::new(Pipeline::new()),
            gate: ApprovalGate::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self) -> WorkflowState {
        self.pipeline().state
    }

    pub fn telemetry(&self) -> Arc<TelemetryMetrics> {
        self.telemetry.snapshot()
    }

    /// Record the human decision. Accepted in any state; last write wins.
    pub fn approve(&self, approved: bool, comments: impl Into<String>) {
        let comments = comments.into();
        tracing::info!(
            session_id = %self.session_id,
            approved,
            state = %self.state(),
            "approval decision received"
        );
        self.gate.resolve(approved, comments);
    }

    /// Run the workflow, sending each event to `tx`, and return the final state
    pub async fn execute(
        &self,
        request: WorkflowRequest,
        tx: mpsc::Sender<WorkflowEvent>,
    ) -> Result<WorkflowState> {
        self.claim()?;
        Ok(self.drive(request, tx).await)
    }

    /// Spawn the run and hand back its event stream
    pub fn run(self: Arc<Self>, request: WorkflowRequest) -> Result<mpsc::Receiver<WorkflowEvent>> {
        self.claim()?;
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        tokio::spawn(async move {
            self.drive(request, tx).await;
        });
        Ok(rx)
    }

    fn claim(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PlannerError::AlreadyStarted(self.session_id.clone()));
        }
        Ok(())
    }

    fn pipeline(&self) -> MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn emit(&self, tx: &mpsc::Sender<WorkflowEvent>, event: WorkflowEvent) {
        tracing::debug!(session_id = %self.session_id, kind = event.kind(), "emit");
        if tx.send(event).await.is_err() {
            tracing::debug!(session_id = %self.session_id, "event receiver dropped");
        }
    }

    #[tracing::instrument(
        name = "workflow",
        skip_all,
        fields(session_id = %self.session_id, hub = %request.hub, mode = ?self.stages.mode())
    )]
    async fn drive(&self, request: WorkflowRequest, tx: mpsc::Sender<WorkflowEvent>) -> WorkflowState {
        tracing::info!(from = %request.date_from, to = %request.date_to, "workflow started");

        let started = self.pipeline().transition(WorkflowState::Running);
        if let Err(e) = started {
            return self.fail(&tx, e.to_string()).await;
        }

        let mut outputs: Vec<PriorOutput> = Vec::with_capacity(StageId::ALL.len());
        let mut plan_result: Option<StageResult> = None;

        for stage in StageId::ALL {
            let input = stage_input(stage, &request, &outputs);
            let result = match self.run_stage(stage, &input, &tx).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(stage = %stage, error = %format!("{:#}", e), "stage failed");
                    return self.fail(&tx, format!("{:#}", e)).await;
                }
            };

            outputs.push(PriorOutput {
                stage,
                text: result.output.clone(),
            });
            if stage == StageId::Planner {
                plan_result = Some(result);
            }

            if stage.next().is_some() && !self.config.stage_pause.is_zero() {
                tokio::time::sleep(self.config.stage_pause).await;
            }
        }

        let Some(plan_result) = plan_result else {
            return self.fail(&tx, "planner produced no result".to_string()).await;
        };

        let proposal = plan_result.extras.plan.unwrap_or_else(|| {
            tracing::warn!("planner returned no structured plan, proposing no actions");
            Default::default()
        });
        let approval = HumanApprovalRequest::from_plan(
            &self.session_id,
            &plan_result.output,
            proposal,
            self.telemetry.snapshot().total_cost_usd,
        );

        let suspended = self.pipeline().transition(WorkflowState::AwaitingApproval);
        if let Err(e) = suspended {
            return self.fail(&tx, e.to_string()).await;
        }
        tracing::info!(
            actions = approval.proposed_actions.len(),
            total_cost_estimate = approval.total_cost_estimate,
            "awaiting approval"
        );
        self.emit(&tx, WorkflowEvent::ApprovalRequested(approval)).await;

        let Some(decision) = self.gate.wait(self.config.approval_timeout).await else {
            tracing::warn!(timeout_secs = self.config.approval_timeout.as_secs(), "approval timed out");
            return self.fail(&tx, APPROVAL_TIMEOUT_MESSAGE.to_string()).await;
        };

        let (status, message) = if decision.approved {
            (
                WorkflowState::Approved,
                "Capacity plan approved and ready for execution".to_string(),
            )
        } else {
            (
                WorkflowState::Rejected,
                format!("Capacity plan rejected: {}", decision.comments),
            )
        };

        let decided = self.pipeline().transition(status);
        if let Err(e) = decided {
            return self.fail(&tx, e.to_string()).await;
        }
        self.emit(
            &tx,
            WorkflowEvent::Completed {
                status,
                session_id: self.session_id.clone(),
                message,
                telemetry: self.telemetry.snapshot(),
            },
        )
        .await;

        let finished = self.pipeline().transition(WorkflowState::Completed);
        if let Err(e) = finished {
            tracing::warn!(error = %e, "could not complete workflow");
            return self.state();
        }

        tracing::info!(status = %status, "workflow completed");
        WorkflowState::Completed
    }

    async fn run_stage(
        &self,
        stage: StageId,
        input: &StageInput,
        tx: &mpsc::Sender<WorkflowEvent>,
    ) -> anyhow::Result<StageResult> {
        self.pipeline().enter(stage)?;

        self.emit(
            tx,
            WorkflowEvent::StageStarted {
                stage,
                input_text: prompts::task_description(stage, &input.request),
                timestamp: Utc::now(),
            },
        )
        .await;

        let result = self
            .stages
            .get(stage)
            .run(input)
            .await
            .with_context(|| format!("{} failed", stage.display_name()))?;

        // Telemetry must include this stage before its completion goes out
        self.telemetry.record(stage, &result.metrics);
        self.pipeline().finish_stage();

        self.emit(
            tx,
            WorkflowEvent::StageCompleted {
                stage,
                output_text: result.output.clone(),
                tool_use: ToolUse::from_result(&result),
                metrics: result.metrics.clone(),
                timestamp: Utc::now(),
            },
        )
        .await;

        Ok(result)
    }

    async fn fail(&self, tx: &mpsc::Sender<WorkflowEvent>, message: String) -> WorkflowState {
        self.pipeline().fail();
        self.emit(
            tx,
            WorkflowEvent::Failed {
                session_id: self.session_id.clone(),
                message,
                telemetry: self.telemetry.snapshot(),
            },
        )
        .await;
        WorkflowState::Error
    }
}

/// Stage 1 gets the request only, stages 2 and 3 the previous output, the
/// planner every prior output.
fn stage_input(stage: StageId, request: &WorkflowRequest, outputs: &[PriorOutput]) -> StageInput {
    let mut input = StageInput::new(request.clone());
    match stage {
        StageId::DataAnalyst => {}
        StageId::Planner => input.prior = outputs.to_vec(),
        StageId::CapacityCalc | StageId::DocResearcher => {
            input.prior.extend(outputs.last().cloned());
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerMode;
    use crate::models::{AgentMetrics, Pricing};
    use crate::stages::{DemoStage, Stage};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    fn request() -> WorkflowRequest {
        WorkflowRequest::new(
            "2026-01-01".parse().unwrap(),
            "2026-01-31".parse().unwrap(),
            "Seattle",
        )
        .unwrap()
    }

    fn quick_config() -> OrchestratorConfig {
        OrchestratorConfig {
            approval_timeout: Duration::from_secs(300),
            stage_pause: Duration::ZERO,
            event_buffer: 64,
        }
    }

    fn demo_stages() -> Arc<StageSet> {
        let config = PlannerConfig {
            simulate_latency: false,
            ..Default::default()
        };
        Arc::new(StageSet::demo(&config))
    }

    async fn collect_until_approval(rx: &mut mpsc::Receiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(event, WorkflowEvent::ApprovalRequested(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn test_stages_complete_in_order_then_approval() {
        let orch = Arc::new(Orchestrator::new("s-1", demo_stages(), quick_config()));
        let mut rx = Arc::clone(&orch).run(request()).unwrap();

        let events = collect_until_approval(&mut rx).await;
        let completed: Vec<StageId> = events
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::StageCompleted { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(completed, StageId::ALL.to_vec());
        assert_eq!(events.len(), 9);

        let WorkflowEvent::StageStarted { input_text, .. } = &events[0] else {
            panic!("first event should start stage 1");
        };
        assert_eq!(
            input_text,
            "Analyzing shipments from Seattle hub (2026-01-01 to 2026-01-31)"
        );

        let WorkflowEvent::ApprovalRequested(approval) = events.last().unwrap() else {
            panic!("last event should be the approval request");
        };
        assert_eq!(approval.proposed_actions.len(), 4);
        assert_eq!(approval.session_id, "s-1");
        let telemetry = orch.telemetry();
        assert!(
            (approval.total_cost_estimate - (88970.0 + telemetry.total_cost_usd)).abs() < 1e-6
        );
        assert_eq!(orch.state(), WorkflowState::AwaitingApproval);

        orch.approve(true, "");
        match rx.recv().await.unwrap() {
            WorkflowEvent::Completed {
                status, session_id, ..
            } => {
                assert_eq!(status, WorkflowState::Approved);
                assert_eq!(session_id, "s-1");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.recv().await.is_none());
        assert_eq!(orch.state(), WorkflowState::Completed);
    }

    #[tokio::test]
    async fn test_rejection_carries_comments() {
        let orch = Orchestrator::new("s-2", demo_stages(), quick_config());
        let (tx, mut rx) = mpsc::channel(64);
        orch.approve(false, "needs revision");

        let state = orch.execute(request(), tx).await.unwrap();
        assert_eq!(state, WorkflowState::Completed);

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        match last.unwrap() {
            WorkflowEvent::Completed {
                status, message, ..
            } => {
                assert_eq!(status, WorkflowState::Rejected);
                assert!(message.contains("needs revision"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_approval_timeout() {
        let orch = Orchestrator::new("s-3", demo_stages(), quick_config());
        let (tx, mut rx) = mpsc::channel(64);

        let state = orch.execute(request(), tx).await.unwrap();
        assert_eq!(state, WorkflowState::Error);
        assert_eq!(orch.state(), WorkflowState::Error);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        match terminal[0] {
            WorkflowEvent::Failed {
                message, telemetry, ..
            } => {
                assert_eq!(message, APPROVAL_TIMEOUT_MESSAGE);
                assert_eq!(telemetry.agents_completed, 4);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_pass() {
        let orch = Arc::new(Orchestrator::new("s-4", demo_stages(), quick_config()));
        let _rx = Arc::clone(&orch).run(request()).unwrap();
        assert!(matches!(
            Arc::clone(&orch).run(request()),
            Err(PlannerError::AlreadyStarted(_))
        ));
        let (tx, _rx2) = mpsc::channel(1);
        assert!(orch.execute(request(), tx).await.is_err());
    }

    /// Fails when called; records the input it was given
    struct FailingStage {
        id: StageId,
    }

    #[async_trait]
    impl Stage for FailingStage {
        fn id(&self) -> StageId {
            self.id
        }

        async fn run(&self, _input: &StageInput) -> anyhow::Result<StageResult> {
            anyhow::bail!("database unreachable")
        }
    }

    /// Records the prior outputs it receives
    struct RecordingStage {
        inner: DemoStage,
        seen: Arc<StdMutex<Vec<(StageId, Vec<StageId>)>>>,
    }

    #[async_trait]
    impl Stage for RecordingStage {
        fn id(&self) -> StageId {
            self.inner.id()
        }

        async fn run(&self, input: &StageInput) -> anyhow::Result<StageResult> {
            self.seen
                .lock()
                .unwrap()
                .push((self.id(), input.prior.iter().map(|p| p.stage).collect()));
            self.inner.run(input).await
        }
    }

    #[tokio::test]
    async fn test_stage_failure_stops_pipeline() {
        let pricing = Pricing::default();
        let demo = |id| Arc::new(DemoStage::new(id, pricing.clone(), false)) as Arc<dyn Stage>;
        let stages = StageSet::new(
            PlannerMode::Demo,
            [
                demo(StageId::DataAnalyst),
                Arc::new(FailingStage {
                    id: StageId::CapacityCalc,
                }),
                demo(StageId::DocResearcher),
                demo(StageId::Planner),
            ],
        )
        .unwrap();

        let orch = Orchestrator::new("s-5", Arc::new(stages), quick_config());
        let (tx, mut rx) = mpsc::channel(64);
        assert_eq!(orch.execute(request(), tx).await.unwrap(), WorkflowState::Error);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        // start 1, complete 1, start 2, error
        assert_eq!(events.len(), 4);
        match events.last().unwrap() {
            WorkflowEvent::Failed {
                message, telemetry, ..
            } => {
                assert!(message.contains("database unreachable"));
                assert!(message.contains("Capacity Calculator"));
                assert_eq!(telemetry.agents_completed, 1);
                assert_eq!(telemetry.total_input_tokens, 245);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!events
            .iter()
            .any(|e| matches!(e, WorkflowEvent::ApprovalRequested(_))));
    }

    #[tokio::test]
    async fn test_stage_inputs_are_chained() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let stage = |id| {
            Arc::new(RecordingStage {
                inner: DemoStage::new(id, Pricing::default(), false),
                seen: Arc::clone(&seen),
            }) as Arc<dyn Stage>
        };
        let stages = StageSet::new(PlannerMode::Demo, StageId::ALL.map(stage)).unwrap();

        let orch = Orchestrator::new("s-6", Arc::new(stages), quick_config());
        orch.approve(true, "");
        let (tx, _rx) = mpsc::channel(64);
        orch.execute(request(), tx).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (StageId::DataAnalyst, vec![]),
                (StageId::CapacityCalc, vec![StageId::DataAnalyst]),
                (StageId::DocResearcher, vec![StageId::CapacityCalc]),
                (
                    StageId::Planner,
                    vec![
                        StageId::DataAnalyst,
                        StageId::CapacityCalc,
                        StageId::DocResearcher
                    ]
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_telemetry_precedes_completion() {
        let orch = Arc::new(Orchestrator::new("s-7", demo_stages(), quick_config()));
        let mut rx = Arc::clone(&orch).run(request()).unwrap();

        let mut completed = 0;
        while let Some(event) = rx.recv().await {
            match event {
                WorkflowEvent::StageCompleted { .. } => {
                    completed += 1;
                    assert!(orch.telemetry().agents_completed >= completed);
                }
                WorkflowEvent::ApprovalRequested(_) => break,
                _ => {}
            }
        }
        assert_eq!(completed, 4);
        let telemetry = orch.telemetry();
        let expected: AgentMetrics = AgentMetrics::priced(245, 1850, 2000, 5, &Pricing::default());
        assert_eq!(
            telemetry.agent_metrics.get(&StageId::DataAnalyst),
            Some(&expected)
        );
    }
}

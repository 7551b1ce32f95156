//! # Workflow Service
//!
//! Facade used by the HTTP and WebSocket handlers. Owns the session registry
//! and the stage sets, and spawns a driver per orchestrator.

use serde::Serialize;
use std::sync::Arc;

use crate::config::{PlannerConfig, PlannerMode};
use crate::error::{PlannerError, Result};
use crate::hub::ConnectionHub;
use crate::models::WorkflowRequest;
use crate::protocol::{ApprovalResponse, ServerMessage};
use crate::stages::StageSet;

use super::driver;
use super::orchestrator::{Orchestrator, OrchestratorConfig};
use super::pipeline::WorkflowState;
use super::registry::{Session, SessionRegistry};
use super::telemetry::TelemetryMetrics;

/// Where to find a freshly started workflow
#[derive(Debug, Clone, Serialize)]
pub struct StartedWorkflow {
    pub session_id: String,
    /// Path of the session's live channel
    pub websocket_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub session_id: String,
    pub state: WorkflowState,
    pub telemetry: TelemetryMetrics,
}

pub struct WorkflowService {
    config: PlannerConfig,
    orchestrator_config: OrchestratorConfig,
    demo: Arc<StageSet>,
    live: Option<Arc<StageSet>>,
    sessions: SessionRegistry,
    hub: Arc<ConnectionHub>,
}

impl WorkflowService {
    /// Build the service; live stages are available when credentials are set
    pub fn new(config: PlannerConfig, hub: Arc<ConnectionHub>) -> Self {
        let demo = StageSet::demo(&config);
        let live = if config.llm.has_credentials() {
            match StageSet::live(&config) {
                Ok(stages) => Some(stages),
                Err(e) => {
                    tracing::warn!(error = %e, "live stages unavailable");
                    None
                }
            }
        } else {
            None
        };
        Self::with_stages(config, hub, demo, live)
    }

    /// Build the service around explicit stage sets
    pub fn with_stages(
        config: PlannerConfig,
        hub: Arc<ConnectionHub>,
        demo: StageSet,
        live: Option<StageSet>,
    ) -> Self {
        Self {
            orchestrator_config: OrchestratorConfig::from(&config),
            config,
            demo: Arc::new(demo),
            live: live.map(Arc::new),
            sessions: SessionRegistry::new(),
            hub,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    pub fn live_available(&self) -> bool {
        self.live.is_some()
    }

    fn stages_for(&self, mode: PlannerMode) -> Result<Arc<StageSet>> {
        match mode {
            PlannerMode::Demo => Ok(Arc::clone(&self.demo)),
            PlannerMode::Live => self
                .live
                .clone()
                .ok_or(PlannerError::LiveModeUnavailable),
        }
    }

    fn orchestrator(&self, session_id: &str, mode: PlannerMode) -> Result<Arc<Orchestrator>> {
        Ok(Arc::new(Orchestrator::new(
            session_id,
            self.stages_for(mode)?,
            self.orchestrator_config.clone(),
        )))
    }

    /// Validate the request, register a new session and start its run
    pub async fn start(
        &self,
        request: WorkflowRequest,
        mode: PlannerMode,
        session_id: Option<String>,
    ) -> Result<StartedWorkflow> {
        request.validate()?;
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let orchestrator = self.orchestrator(&session_id, mode)?;

        self.sessions
            .insert(
                &session_id,
                Session {
                    orchestrator: Arc::clone(&orchestrator),
                    request: request.clone(),
                    mode,
                },
            )
            .await;
        self.launch(&session_id, orchestrator, request).await;

        tracing::info!(session_id = %session_id, ?mode, "workflow started");
        Ok(StartedWorkflow {
            websocket_url: format!("/ws/{}", session_id),
            session_id,
        })
    }

    async fn launch(&self, session_id: &str, orchestrator: Arc<Orchestrator>, request: WorkflowRequest) {
        let task = tokio::spawn(driver::drive(
            Arc::clone(&orchestrator),
            request,
            Arc::clone(&self.hub),
        ));
        self.sessions
            .attach_driver(session_id, &orchestrator, task.abort_handle())
            .await;
    }

    /// Approve the plan awaiting a decision
    pub async fn approve(&self, session_id: &str, comments: impl Into<String>) -> Result<()> {
        self.decide(session_id, true, comments.into()).await
    }

    /// Reject the plan awaiting a decision; the run ends as rejected
    pub async fn reject(&self, session_id: &str, comments: impl Into<String>) -> Result<()> {
        self.decide(session_id, false, comments.into()).await
    }

    async fn decide(&self, session_id: &str, approved: bool, comments: String) -> Result<()> {
        let session = self.sessions.get(session_id).await?;

        // The ack must reach subscribers before any outcome frame
        let message = if approved {
            "Capacity plan approved for execution"
        } else {
            "Capacity plan rejected"
        };
        let ack = ServerMessage::ApprovalResponse {
            payload: ApprovalResponse {
                approved,
                comments: comments.clone(),
                message: message.to_string(),
            },
        };
        driver::send(&self.hub, session_id, &ack).await;
        session.orchestrator.approve(approved, comments);
        Ok(())
    }

    /// Discard the session's orchestrator and start over from stage 1 with
    /// the original request
    pub async fn rerun(&self, session_id: &str) -> Result<()> {
        let session = self.sessions.get(session_id).await?;
        let orchestrator = self.orchestrator(session_id, session.mode)?;
        let session = self
            .sessions
            .replace(session_id, Arc::clone(&orchestrator))
            .await?;
        self.launch(session_id, orchestrator, session.request).await;
        tracing::info!(session_id, "workflow re-run started");
        Ok(())
    }

    pub async fn session(&self, session_id: &str) -> Result<Session> {
        self.sessions.get(session_id).await
    }

    pub async fn status(&self, session_id: &str) -> Result<WorkflowStatus> {
        let session = self.sessions.get(session_id).await?;
        Ok(WorkflowStatus {
            session_id: session_id.to_string(),
            state: session.orchestrator.state(),
            telemetry: (*session.orchestrator.telemetry()).clone(),
        })
    }

    pub async fn telemetry(&self, session_id: &str) -> Result<Arc<TelemetryMetrics>> {
        Ok(self.sessions.get(session_id).await?.orchestrator.telemetry())
    }

    pub async fn active_workflows(&self) -> usize {
        self.sessions.len().await
    }

    /// Abort every driver and forget all sessions and connections
    pub async fn shutdown(&self) {
        let aborted = self.sessions.clear().await;
        self.hub.clear().await;
        tracing::info!(aborted, "workflow service shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Connection;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn service() -> WorkflowService {
        let config = PlannerConfig {
            simulate_latency: false,
            stage_pause_ms: 0,
            ..Default::default()
        };
        WorkflowService::new(config, Arc::new(ConnectionHub::new()))
    }

    fn request() -> WorkflowRequest {
        WorkflowRequest::new(
            "2026-01-01".parse().unwrap(),
            "2026-01-31".parse().unwrap(),
            "Seattle",
        )
        .unwrap()
    }

    async fn next_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> ServerMessage {
        let frame = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("frame in time")
            .expect("channel open");
        serde_json::from_str(&frame).unwrap()
    }

    async fn wait_for_approval_request(rx: &mut mpsc::UnboundedReceiver<String>) {
        loop {
            if let ServerMessage::ApprovalRequest { payload } = next_frame(rx).await {
                assert_eq!(payload.proposed_actions.len(), 4);
                return;
            }
        }
    }

    async fn wait_for_terminal(rx: &mut mpsc::UnboundedReceiver<String>) -> ServerMessage {
        loop {
            let frame = next_frame(rx).await;
            if matches!(
                frame,
                ServerMessage::WorkflowComplete { .. } | ServerMessage::Error { .. }
            ) {
                return frame;
            }
        }
    }

    #[tokio::test]
    async fn test_start_and_approve() {
        let service = service();
        let (conn, mut rx) = Connection::channel();
        service.hub().register(conn, Some("fixed-id")).await;

        let started = service
            .start(request(), PlannerMode::Demo, Some("fixed-id".to_string()))
            .await
            .unwrap();
        assert_eq!(started.session_id, "fixed-id");
        assert_eq!(started.websocket_url, "/ws/fixed-id");

        wait_for_approval_request(&mut rx).await;
        assert_eq!(
            service.status("fixed-id").await.unwrap().state,
            WorkflowState::AwaitingApproval
        );

        tokio_test::assert_ok!(service.approve("fixed-id", "").await);
        match wait_for_terminal(&mut rx).await {
            ServerMessage::WorkflowComplete { status, .. } => {
                assert_eq!(status, WorkflowState::Approved)
            }
            other => panic!("unexpected frame {:?}", other),
        }
        let telemetry = service.telemetry("fixed-id").await.unwrap();
        assert_eq!(telemetry.agents_completed, 4);
    }

    #[tokio::test]
    async fn test_rest_reject_completes_as_rejected() {
        let service = service();
        let started = service.start(request(), PlannerMode::Demo, None).await.unwrap();
        let (conn, mut rx) = Connection::channel();
        service.hub().register(conn, Some(&started.session_id)).await;

        // The decision may land before the checkpoint; it is still observed
        service
            .reject(&started.session_id, "needs revision")
            .await
            .unwrap();
        match wait_for_terminal(&mut rx).await {
            ServerMessage::WorkflowComplete { status, message, .. } => {
                assert_eq!(status, WorkflowState::Rejected);
                assert!(message.contains("needs revision"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rerun_keeps_request() {
        let service = service();
        let started = service.start(request(), PlannerMode::Demo, None).await.unwrap();
        let id = started.session_id;
        let first = service.session(&id).await.unwrap().orchestrator;

        service.rerun(&id).await.unwrap();
        service.rerun(&id).await.unwrap();

        let session = service.session(&id).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &session.orchestrator));
        assert_eq!(session.request, request());
        assert_eq!(service.active_workflows().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_and_validation() {
        let service = service();
        assert!(matches!(
            service.approve("nope", "").await,
            Err(PlannerError::SessionNotFound(_))
        ));
        assert!(matches!(
            service.status("nope").await,
            Err(PlannerError::SessionNotFound(_))
        ));
        assert!(service.rerun("nope").await.is_err());

        let backwards = WorkflowRequest {
            date_from: "2026-02-01".parse().unwrap(),
            date_to: "2026-01-01".parse().unwrap(),
            hub: "Seattle".to_string(),
        };
        assert!(matches!(
            service.start(backwards, PlannerMode::Demo, None).await,
            Err(PlannerError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            service.start(request(), PlannerMode::Live, None).await,
            Err(PlannerError::LiveModeUnavailable)
        ));
        assert_eq!(service.active_workflows().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_clears_sessions() {
        let service = service();
        service.start(request(), PlannerMode::Demo, None).await.unwrap();
        service.start(request(), PlannerMode::Demo, None).await.unwrap();
        assert_eq!(service.active_workflows().await, 2);

        service.shutdown().await;
        assert_eq!(service.active_workflows().await, 0);
    }
}

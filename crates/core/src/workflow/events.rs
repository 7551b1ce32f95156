//! # Workflow Events
//!
//! Closed set of events an orchestrator emits during one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::AgentMetrics;
use crate::plan::HumanApprovalRequest;
use crate::stages::StageResult;

use super::pipeline::{StageId, WorkflowState};
use super::telemetry::TelemetryMetrics;

/// Summary of the tools a stage used
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_executed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<String>>,
}

impl ToolUse {
    pub fn from_result(result: &StageResult) -> Self {
        let extras = &result.extras;
        Self {
            tools: result.tools_used.clone(),
            code_executed: extras.code_executed.then_some(true),
            documents: (!extras.documents_searched.is_empty())
                .then(|| extras.documents_searched.clone()),
        }
    }
}

/// One step of a workflow run
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    StageStarted {
        stage: StageId,
        input_text: String,
        timestamp: DateTime<Utc>,
    },
    StageCompleted {
        stage: StageId,
        output_text: String,
        tool_use: ToolUse,
        metrics: AgentMetrics,
        timestamp: DateTime<Utc>,
    },
    ApprovalRequested(HumanApprovalRequest),
    /// Terminal success; `status` is `Approved` or `Rejected`
    Completed {
        status: WorkflowState,
        session_id: String,
        message: String,
        telemetry: Arc<TelemetryMetrics>,
    },
    /// Terminal failure: stage error or approval timeout
    Failed {
        session_id: String,
        message: String,
        telemetry: Arc<TelemetryMetrics>,
    },
}

impl WorkflowEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::Completed { .. } | WorkflowEvent::Failed { .. }
        )
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::StageStarted { .. } => "stage_started",
            WorkflowEvent::StageCompleted { .. } => "stage_completed",
            WorkflowEvent::ApprovalRequested(_) => "approval_requested",
            WorkflowEvent::Completed { .. } => "completed",
            WorkflowEvent::Failed { .. } => "failed",
        }
    }
}

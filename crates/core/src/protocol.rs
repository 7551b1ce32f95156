//! # Live Channel Protocol
//!
//! JSON frames exchanged over a session's live channel. Every frame carries a
//! `type` discriminator; timestamps are RFC 3339 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AgentMetrics;
use crate::plan::HumanApprovalRequest;
use crate::workflow::{StageId, TelemetryMetrics, ToolUse, WorkflowEvent, WorkflowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Completed,
}

/// Progress of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub agent_id: StageId,
    pub agent_name: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use: Option<ToolUse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,
    pub timestamp: DateTime<Utc>,
}

/// Acknowledgement of a decision made through the REST surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approved: bool,
    pub comments: String,
    pub message: String,
}

/// Server → client frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        session_id: String,
        message: String,
    },
    AgentUpdate {
        payload: AgentUpdate,
    },
    ApprovalRequest {
        payload: HumanApprovalRequest,
    },
    ApprovalResponse {
        payload: ApprovalResponse,
    },
    Telemetry {
        payload: TelemetryMetrics,
    },
    WorkflowComplete {
        status: WorkflowState,
        session_id: String,
        message: String,
        telemetry: TelemetryMetrics,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        telemetry: Option<TelemetryMetrics>,
    },
    Pong,
}

impl ServerMessage {
    pub fn connected(session_id: &str) -> Self {
        ServerMessage::Connected {
            session_id: session_id.to_string(),
            message: "Connected to workflow updates".to_string(),
        }
    }

    /// Error reply that does not belong to a workflow outcome
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            session_id: None,
            message: message.into(),
            telemetry: None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&WorkflowEvent> for ServerMessage {
    fn from(event: &WorkflowEvent) -> Self {
        match event {
            WorkflowEvent::StageStarted {
                stage,
                input_text,
                timestamp,
            } => ServerMessage::AgentUpdate {
                payload: AgentUpdate {
                    agent_id: *stage,
                    agent_name: stage.display_name().to_string(),
                    status: AgentStatus::Running,
                    input_text: Some(input_text.clone()),
                    output_text: None,
                    tool_use: None,
                    metrics: None,
                    timestamp: *timestamp,
                },
            },
            WorkflowEvent::StageCompleted {
                stage,
                output_text,
                tool_use,
                metrics,
                timestamp,
            } => ServerMessage::AgentUpdate {
                payload: AgentUpdate {
                    agent_id: *stage,
                    agent_name: stage.display_name().to_string(),
                    status: AgentStatus::Completed,
                    input_text: None,
                    output_text: Some(output_text.clone()),
                    tool_use: Some(tool_use.clone()),
                    metrics: Some(metrics.clone()),
                    timestamp: *timestamp,
                },
            },
            WorkflowEvent::ApprovalRequested(request) => ServerMessage::ApprovalRequest {
                payload: request.clone(),
            },
            WorkflowEvent::Completed {
                status,
                session_id,
                message,
                telemetry,
            } => ServerMessage::WorkflowComplete {
                status: *status,
                session_id: session_id.clone(),
                message: message.clone(),
                telemetry: (**telemetry).clone(),
            },
            WorkflowEvent::Failed {
                session_id,
                message,
                telemetry,
            } => ServerMessage::Error {
                session_id: Some(session_id.clone()),
                message: message.clone(),
                telemetry: Some((**telemetry).clone()),
            },
        }
    }
}

/// Client → server frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Approve {
        #[serde(default)]
        comments: String,
    },
    Reject {
        #[serde(default)]
        comments: String,
    },
}

//! # Workflow Orchestration
//!
//! Runs the capacity planning pipeline for a session.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Data Analyst → Capacity Calculator → Document Researcher → Planner → Human Approval
//! ```

pub mod approval;
pub mod driver;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod telemetry;

pub use approval::{ApprovalDecision, ApprovalGate};
pub use events::{ToolUse, WorkflowEvent};
pub use orchestrator::{Orchestrator, OrchestratorConfig, APPROVAL_TIMEOUT_MESSAGE};
pub use pipeline::{Pipeline, StageDescriptor, StageId, WorkflowState};
pub use registry::{Session, SessionRegistry};
pub use service::{StartedWorkflow, WorkflowService, WorkflowStatus};
pub use telemetry::{TelemetryAggregator, TelemetryMetrics};

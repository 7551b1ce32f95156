//! # Planner Core
//!
//! Business logic of the capacity planner: the four-stage workflow, its
//! human approval checkpoint, telemetry and live fan-out.
//!
//! ## Architecture
//!
//! - `workflow/` - Orchestrator, session registry and the service facade
//! - `stages/` - Stage contract with demo and live implementations
//! - `hub` - Per-session fan-out of live channel frames
//! - `protocol` - JSON frames of the live channel
//! - `config` - Runtime configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use planner_core::{ConnectionHub, PlannerConfig, PlannerMode, WorkflowRequest, WorkflowService};
//!
//! let hub = Arc::new(ConnectionHub::new());
//! let service = WorkflowService::new(PlannerConfig::default(), hub);
//! let started = service.start(request, PlannerMode::Demo, None).await?;
//! service.approve(&started.session_id, "").await?;
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod models;
pub mod plan;
pub mod protocol;
pub mod stages;
pub mod workflow;

pub use config::{PlannerConfig, PlannerMode};
pub use error::{PlannerError, Result};
pub use hub::{Connection, ConnectionHub, ConnectionId};
pub use models::{AgentMetrics, Pricing, WorkflowRequest};
pub use workflow::{StageId, WorkflowService, WorkflowState};

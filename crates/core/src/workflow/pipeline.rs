//! # Pipeline Stages
//!
//! The four stages of the planning pipeline and the workflow state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PlannerError, Result};

/// Stage of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Gathers shipment, fleet, route and crew data
    DataAnalyst,
    /// Computes aircraft, fuel and crew requirements
    CapacityCalc,
    /// Checks the numbers against policy documents and regulations
    DocResearcher,
    /// Synthesises the final plan that goes to a human for approval
    Planner,
}

/// Static description of a stage, shown by the UI
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StageDescriptor {
    pub id: StageId,
    pub name: &'static str,
    pub description: &'static str,
    pub tool: &'static str,
}

impl StageId {
    pub const ALL: [StageId; 4] = [
        StageId::DataAnalyst,
        StageId::CapacityCalc,
        StageId::DocResearcher,
        StageId::Planner,
    ];

    /// Total number of stages in one run
    pub const COUNT: u32 = 4;

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::DataAnalyst => "data_analyst",
            StageId::CapacityCalc => "capacity_calc",
            StageId::DocResearcher => "doc_researcher",
            StageId::Planner => "planner",
        }
    }

    pub fn display_name(&self) -> &'static str {
        self.descriptor().name
    }

    /// 1-based position in the pipeline
    pub fn position(&self) -> u32 {
        match self {
            StageId::DataAnalyst => 1,
            StageId::CapacityCalc => 2,
            StageId::DocResearcher => 3,
            StageId::Planner => 4,
        }
    }

    pub fn next(&self) -> Option<StageId> {
        match self {
            StageId::DataAnalyst => Some(StageId::CapacityCalc),
            StageId::CapacityCalc => Some(StageId::DocResearcher),
            StageId::DocResearcher => Some(StageId::Planner),
            StageId::Planner => None,
        }
    }

    pub fn descriptor(&self) -> StageDescriptor {
        match self {
            StageId::DataAnalyst => StageDescriptor {
                id: *self,
                name: "Data Analyst",
                description: "Queries shipment data from the operations database",
                tool: "MCP (PostgreSQL)",
            },
            StageId::CapacityCalc => StageDescriptor {
                id: *self,
                name: "Capacity Calculator",
                description: "Performs calculations for logistics planning",
                tool: "Code Interpreter",
            },
            StageId::DocResearcher => StageDescriptor {
                id: *self,
                name: "Document Researcher",
                description: "Searches policy documents and regulations",
                tool: "File Search",
            },
            StageId::Planner => StageDescriptor {
                id: *self,
                name: "Planner",
                description: "Synthesizes data into a comprehensive capacity plan",
                tool: "Synthesis",
            },
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one workflow run.
///
/// `Initialized → Running → AwaitingApproval → {Approved | Rejected} → Completed`,
/// with `Error` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Initialized,
    Running,
    AwaitingApproval,
    Approved,
    Rejected,
    Completed,
    Error,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Initialized => "initialized",
            WorkflowState::Running => "running",
            WorkflowState::AwaitingApproval => "awaiting_approval",
            WorkflowState::Approved => "approved",
            WorkflowState::Rejected => "rejected",
            WorkflowState::Completed => "completed",
            WorkflowState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Error)
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, next) {
            (Completed | Error, _) => false,
            (_, Error) => true,
            (Initialized, Running) => true,
            (Running, AwaitingApproval) => true,
            (AwaitingApproval, Approved | Rejected) => true,
            (Approved | Rejected, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Current workflow state
    pub state: WorkflowState,
    /// Stage currently executing (or last executed)
    pub stage: Option<StageId>,
    /// Stages whose completion has been recorded
    pub completed: u32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            state: WorkflowState::Initialized,
            stage: None,
            completed: 0,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `next`, rejecting edges the state machine does not have.
    /// The approval checkpoint is only reachable once every stage finished.
    pub fn transition(&mut self, next: WorkflowState) -> Result<()> {
        let checkpoint_early = next == WorkflowState::AwaitingApproval && !self.all_stages_done();
        if checkpoint_early || !self.state.can_transition_to(next) {
            return Err(PlannerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Enter the given stage; stages must be entered strictly in order
    pub fn enter(&mut self, stage: StageId) -> Result<()> {
        let expected = match self.stage {
            None => Some(StageId::DataAnalyst),
            Some(current) => current.next(),
        };
        if self.state != WorkflowState::Running || expected != Some(stage) {
            return Err(PlannerError::InvalidTransition {
                from: self.state,
                to: WorkflowState::Running,
            });
        }
        self.stage = Some(stage);
        Ok(())
    }

    /// Mark the current stage as finished
    pub fn finish_stage(&mut self) {
        self.completed += 1;
    }

    /// Whether every stage has completed
    pub fn all_stages_done(&self) -> bool {
        self.completed == StageId::COUNT
    }

    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = WorkflowState::Error;
        }
    }
}

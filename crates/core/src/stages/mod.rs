//! # Pipeline Stages
//!
//! Every stage exposes the same contract: take the request plus the text
//! produced by earlier stages, return output text, usage metrics and the tools
//! it used. Stages never touch orchestrator state.
//!
//! Two implementations exist and are chosen when the stage set is built:
//!
//! - `DemoStage` - deterministic fixtures, no network
//! - `LiveStage` - OpenAI-compatible chat completions

pub mod demo;
pub mod live;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{PlannerConfig, PlannerMode};
use crate::error::{PlannerError, Result};
use crate::models::{AgentMetrics, WorkflowRequest};
use crate::plan::PlanProposal;
use crate::workflow::StageId;

pub use demo::DemoStage;
pub use live::{ChatClient, LiveStage};

/// Output of an earlier stage, carried forward as context
#[derive(Debug, Clone)]
pub struct PriorOutput {
    pub stage: StageId,
    pub text: String,
}

/// Input to a stage call
#[derive(Debug, Clone)]
pub struct StageInput {
    pub request: WorkflowRequest,
    /// Outputs this stage builds on, in pipeline order
    pub prior: Vec<PriorOutput>,
}

impl StageInput {
    pub fn new(request: WorkflowRequest) -> Self {
        Self {
            request,
            prior: Vec::new(),
        }
    }

    pub fn with_prior(mut self, stage: StageId, text: impl Into<String>) -> Self {
        self.prior.push(PriorOutput {
            stage,
            text: text.into(),
        });
        self
    }

    /// Prior outputs concatenated with a heading per stage
    pub fn context(&self) -> String {
        self.prior
            .iter()
            .map(|p| format!("=== {} ===\n{}", p.stage.display_name(), p.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Stage-specific extras beyond text and metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageExtras {
    /// Documents consulted by the research stage
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents_searched: Vec<String>,
    /// Whether the stage executed code
    #[serde(default)]
    pub code_executed: bool,
    /// Structured plan, produced by the planner stage only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanProposal>,
}

/// Result of one stage call
#[derive(Debug, Clone)]
pub struct StageResult {
    pub output: String,
    pub metrics: AgentMetrics,
    pub tools_used: Vec<String>,
    pub extras: StageExtras,
}

/// A single pipeline stage
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which pipeline position this stage fills
    fn id(&self) -> StageId;

    /// Run the stage. Errors are fatal to the workflow run.
    async fn run(&self, input: &StageInput) -> anyhow::Result<StageResult>;
}

/// The four stages a workflow runs, one per pipeline position
#[derive(Clone)]
pub struct StageSet {
    mode: PlannerMode,
    stages: [Arc<dyn Stage>; 4],
}

impl std::fmt::Debug for StageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSet").field("mode", &self.mode).finish()
    }
}

impl StageSet {
    /// Assemble a stage set; each stage must sit at its own pipeline position
    pub fn new(mode: PlannerMode, stages: [Arc<dyn Stage>; 4]) -> Result<Self> {
        for (stage, expected) in stages.iter().zip(StageId::ALL) {
            if stage.id() != expected {
                return Err(PlannerError::Config(format!(
                    "stage {} registered at position of {}",
                    stage.id(),
                    expected
                )));
            }
        }
        Ok(Self { mode, stages })
    }

    /// Demo stages backed by fixtures
    pub fn demo(config: &PlannerConfig) -> Self {
        let stages = StageId::ALL.map(|id| {
            Arc::new(DemoStage::new(id, config.pricing.clone(), config.simulate_latency))
                as Arc<dyn Stage>
        });
        Self {
            mode: PlannerMode::Demo,
            stages,
        }
    }

    /// Live stages calling the configured chat-completions endpoint
    pub fn live(config: &PlannerConfig) -> Result<Self> {
        if !config.llm.has_credentials() {
            return Err(PlannerError::LiveModeUnavailable);
        }
        let client = Arc::new(ChatClient::new(config.llm.clone())?);
        let stages = StageId::ALL.map(|id| {
            Arc::new(LiveStage::new(id, Arc::clone(&client), config.pricing.clone()))
                as Arc<dyn Stage>
        });
        Ok(Self {
            mode: PlannerMode::Live,
            stages,
        })
    }

    pub fn mode(&self) -> PlannerMode {
        self.mode
    }

    pub fn get(&self, id: StageId) -> &Arc<dyn Stage> {
        &self.stages[(id.position() - 1) as usize]
    }
}

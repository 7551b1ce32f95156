//! # Telemetry Aggregator
//!
//! Running per-session totals of stage resource usage.
//!
//! Snapshots are copy-on-write: a reader holds an `Arc` to an immutable
//! aggregate, and `record` swaps in a fully updated one. A reader therefore
//! sees either the state before or after a given `record`, never a mix.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{round6, AgentMetrics};

use super::pipeline::StageId;

/// Aggregated resource usage for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    pub session_id: String,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub total_duration_ms: u64,
    pub total_tool_calls: u32,
    pub agents_completed: u32,
    pub agents_total: u32,
    pub agent_metrics: BTreeMap<StageId, AgentMetrics>,
}

impl TelemetryMetrics {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
            total_duration_ms: 0,
            total_tool_calls: 0,
            agents_completed: 0,
            agents_total: StageId::COUNT,
            agent_metrics: BTreeMap::new(),
        }
    }

    /// Fold one stage sample into the totals.
    ///
    /// A repeated sample for the same stage replaces the earlier one, so the
    /// totals always equal the sum over `agent_metrics`.
    fn apply(&mut self, stage: StageId, metrics: &AgentMetrics) {
        match self.agent_metrics.insert(stage, metrics.clone()) {
            Some(previous) => {
                self.total_input_tokens -= previous.input_tokens;
                self.total_output_tokens -= previous.output_tokens;
                self.total_cost_usd -= previous.cost_usd;
                self.total_duration_ms -= previous.duration_ms;
                self.total_tool_calls -= previous.tool_calls;
            }
            None => self.agents_completed += 1,
        }

        self.total_input_tokens += metrics.input_tokens;
        self.total_output_tokens += metrics.output_tokens;
        self.total_tokens = self.total_input_tokens + self.total_output_tokens;
        self.total_cost_usd = round6(self.total_cost_usd + metrics.cost_usd);
        self.total_duration_ms += metrics.duration_ms;
        self.total_tool_calls += metrics.tool_calls;
    }
}

/// Thread-safe accumulator behind the session's telemetry snapshot
#[derive(Debug)]
pub struct TelemetryAggregator {
    current: RwLock<Arc<TelemetryMetrics>>,
}

impl TelemetryAggregator {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Arc::new(TelemetryMetrics::new(session_id))),
        }
    }

    /// Record a stage's metrics and return the updated snapshot
    pub fn record(&self, stage: StageId, metrics: &AgentMetrics) -> Arc<TelemetryMetrics> {
        let snapshot = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            Arc::make_mut(&mut guard).apply(stage, metrics);
            Arc::clone(&guard)
        };

        tracing::info!(
            target: "planner::telemetry",
            session_id = %snapshot.session_id,
            stage = %stage,
            input_tokens = metrics.input_tokens,
            output_tokens = metrics.output_tokens,
            cost_usd = metrics.cost_usd,
            duration_ms = metrics.duration_ms,
            tool_calls = metrics.tool_calls,
            "stage metrics recorded"
        );

        snapshot
    }

    /// Current immutable view
    pub fn snapshot(&self) -> Arc<TelemetryMetrics> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }
}

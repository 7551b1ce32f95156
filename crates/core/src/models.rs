//! # Planner Models
//!
//! Core value types shared by the stages, the orchestrator and the wire
//! protocol: the workflow request, per-stage usage metrics and the
//! pricing table used to derive cost from token counts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};

/// Hub analysed when the caller does not name one
pub const DEFAULT_HUB: &str = "Seattle";

fn default_hub() -> String {
    DEFAULT_HUB.to_string()
}

/// Request to run the capacity planning workflow.
///
/// Immutable once created; the registry keeps a copy so that a rejected plan
/// can be re-run with exactly the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default = "default_hub")]
    pub hub: String,
}

impl WorkflowRequest {
    /// Create a validated request
    pub fn new(date_from: NaiveDate, date_to: NaiveDate, hub: impl Into<String>) -> Result<Self> {
        let request = Self {
            date_from,
            date_to,
            hub: hub.into(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Check `date_from <= date_to`
    pub fn validate(&self) -> Result<()> {
        if self.date_from > self.date_to {
            return Err(PlannerError::InvalidDateRange {
                from: self.date_from,
                to: self.date_to,
            });
        }
        Ok(())
    }

    /// Number of calendar days covered, inclusive
    pub fn days(&self) -> i64 {
        (self.date_to - self.date_from).num_days() + 1
    }
}

/// Resource usage of a single stage execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
    pub cost_usd: f64,
    pub tool_calls: u32,
}

impl AgentMetrics {
    /// Build metrics whose cost is derived from the pricing table
    pub fn priced(
        input_tokens: u64,
        output_tokens: u64,
        duration_ms: u64,
        tool_calls: u32,
        pricing: &Pricing,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            duration_ms,
            cost_usd: pricing.cost(input_tokens, output_tokens),
            tool_calls,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Per-million-token rates for the model backing the stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pricing {
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_cost_per_million: 0.30,
            output_cost_per_million: 1.25,
        }
    }
}

impl Pricing {
    /// Cost in USD for the given token counts, rounded to 6 decimal places
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input = input_tokens as f64 / 1_000_000.0 * self.input_cost_per_million;
        let output = output_tokens as f64 / 1_000_000.0 * self.output_cost_per_million;
        round6(input + output)
    }
}

pub(crate) fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Configuration of the OpenAI-compatible endpoint used by live stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL, e.g. "https://api.openai.com/v1"
    pub base_url: String,
    /// Model or deployment name
    pub model: String,
    /// API key; read from the environment, never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Upper bound for one chat-completions call
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-5-mini".to_string(),
            api_key: None,
            request_timeout_secs: 120,
        }
    }
}

impl ModelConfig {
    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

//! # Planner Configuration
//!
//! Defaults, overlaid by an optional JSON file, overlaid by environment
//! variables. The server loads `.env` before calling [`PlannerConfig::load`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PlannerError, Result};
use crate::models::{ModelConfig, Pricing};

/// Config file read when no explicit path is given
pub const DEFAULT_CONFIG_PATH: &str = ".planner/config.json";

/// Which stage implementation a workflow uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerMode {
    /// Fixture-backed stages, no external calls
    #[default]
    Demo,
    /// Stages backed by a chat-completions endpoint
    Live,
}

impl std::str::FromStr for PlannerMode {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "demo" => Ok(PlannerMode::Demo),
            "live" => Ok(PlannerMode::Live),
            other => Err(PlannerError::Config(format!("unknown mode '{}'", other))),
        }
    }
}

/// Configuration for the planner runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Default stage implementation
    pub mode: PlannerMode,
    /// How long a finished plan waits for a human decision
    pub approval_timeout_secs: u64,
    /// Pause between stages so the live feed is readable
    pub stage_pause_ms: u64,
    /// Whether demo stages sleep to imitate real work
    pub simulate_latency: bool,
    /// Capacity of the orchestrator's event channel
    pub event_buffer: usize,
    /// Token pricing used for every cost figure
    pub pricing: Pricing,
    /// Endpoint for live stages
    pub llm: ModelConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: PlannerMode::Demo,
            approval_timeout_secs: 300,
            stage_pause_ms: 500,
            simulate_latency: true,
            event_buffer: 64,
            pricing: Pricing::default(),
            llm: ModelConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Load from `path` (or the default location) and apply env overrides
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| PlannerError::Config(format!("{}: {}", path.display(), e)))?;
            let parsed: PlannerConfig = serde_json::from_str(&raw)
                .map_err(|e| PlannerError::Config(format!("{}: {}", path.display(), e)))?;
            tracing::info!(path = %path.display(), "Loaded planner config");
            parsed
        } else {
            PlannerConfig::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PLANNER_*` / `LLM_*` overrides from a key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("PLANNER_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(v) = lookup("PLANNER_APPROVAL_TIMEOUT_SECS") {
            self.approval_timeout_secs = parse_number("PLANNER_APPROVAL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PLANNER_STAGE_PAUSE_MS") {
            self.stage_pause_ms = parse_number("PLANNER_STAGE_PAUSE_MS", &v)?;
        }
        if let Some(v) = lookup("PLANNER_SIMULATE_LATENCY") {
            self.simulate_latency = parse_number("PLANNER_SIMULATE_LATENCY", &v)?;
        }
        if let Some(v) = lookup("PLANNER_INPUT_COST_PER_MILLION") {
            self.pricing.input_cost_per_million =
                parse_number("PLANNER_INPUT_COST_PER_MILLION", &v)?;
        }
        if let Some(v) = lookup("PLANNER_OUTPUT_COST_PER_MILLION") {
            self.pricing.output_cost_per_million =
                parse_number("PLANNER_OUTPUT_COST_PER_MILLION", &v)?;
        }
        if let Some(url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = lookup("LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        Ok(())
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    pub fn stage_pause(&self) -> Duration {
        Duration::from_millis(self.stage_pause_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PlannerError::Config(format!("{} has invalid value '{}'", key, value)))
}

//! # Planner Errors
//!
//! Boundary error taxonomy. Stage failures never surface here: the
//! orchestrator converts them into a single `error` event instead.

use chrono::NaiveDate;
use thiserror::Error;

use crate::workflow::WorkflowState;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("date_from ({from}) must not be after date_to ({to})")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },

    #[error("Workflow not found: {0}")]
    SessionNotFound(String),

    #[error("Workflow {0} has already been started")]
    AlreadyStarted(String),

    #[error("Invalid workflow transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("Live mode requested but no LLM API key is configured")]
    LiveModeUnavailable,

    #[error("Config error: {0}")]
    Config(String),
}

impl PlannerError {
    /// Whether the error was caused by the caller's input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDateRange { .. } | Self::LiveModeUnavailable
        )
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;

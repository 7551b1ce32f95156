//! # Workflow API
//!
//! Start a planning run, resolve its approval checkpoint and read its state.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use planner_core::models::DEFAULT_HUB;
use planner_core::workflow::TelemetryMetrics;
use planner_core::{PlannerMode, WorkflowRequest, WorkflowState};

use super::ApiError;
use crate::AppState;

fn default_hub() -> String {
    DEFAULT_HUB.to_string()
}

/// Request to start a planning run
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartWorkflowRequest {
    /// First day of the planning period
    pub date_from: NaiveDate,
    /// Last day of the planning period (inclusive)
    pub date_to: NaiveDate,
    #[serde(default = "default_hub")]
    pub hub: String,
    /// `false` runs the live model-backed stages; omitted uses the configured mode
    #[serde(default)]
    pub demo_mode: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartWorkflowResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
    pub websocket_url: String,
}

/// Acknowledgement of an approve/reject call
#[derive(Debug, Serialize, ToSchema)]
pub struct DecisionResponse {
    pub status: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkflowStatusResponse {
    pub session_id: String,
    #[schema(value_type = String, example = "awaiting_approval")]
    pub state: WorkflowState,
    #[schema(value_type = Object)]
    pub telemetry: TelemetryMetrics,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DecisionQuery {
    /// Free-text reviewer comments
    #[serde(default)]
    pub comments: String,
}

pub fn workflow_routes() -> Router<AppState> {
    Router::new()
        .route("/start", post(start_workflow))
        .route("/:session_id", get(get_workflow))
        .route("/:session_id/approve", post(approve_workflow))
        .route("/:session_id/reject", post(reject_workflow))
}

/// Start a new capacity planning run
#[utoipa::path(
    post,
    path = "/api/workflow/start",
    tag = "workflow",
    request_body = StartWorkflowRequest,
    responses(
        (status = 200, description = "Workflow started", body = StartWorkflowResponse),
        (status = 400, description = "Live mode unavailable"),
        (status = 422, description = "Invalid date range")
    )
)]
pub async fn start_workflow(
    State(state): State<AppState>,
    Json(req): Json<StartWorkflowRequest>,
) -> Result<Json<StartWorkflowResponse>, ApiError> {
    let mode = match req.demo_mode {
        Some(true) => PlannerMode::Demo,
        Some(false) => PlannerMode::Live,
        None => state.service.config().mode,
    };
    let request = WorkflowRequest::new(req.date_from, req.date_to, req.hub)?;
    let started = state.service.start(request, mode, None).await?;

    Ok(Json(StartWorkflowResponse {
        session_id: started.session_id,
        status: "started".to_string(),
        message: "Workflow started. Connect to WebSocket for real-time updates.".to_string(),
        websocket_url: started.websocket_url,
    }))
}

/// Approve the plan awaiting a decision
#[utoipa::path(
    post,
    path = "/api/workflow/{session_id}/approve",
    tag = "workflow",
    params(("session_id" = String, Path, description = "Workflow session id"), DecisionQuery),
    responses(
        (status = 200, description = "Plan approved", body = DecisionResponse),
        (status = 404, description = "Workflow not found")
    )
)]
pub async fn approve_workflow(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<DecisionResponse>, ApiError> {
    state.service.approve(&session_id, query.comments).await?;
    Ok(Json(DecisionResponse {
        status: "approved".to_string(),
        session_id,
    }))
}

/// Reject the plan awaiting a decision
#[utoipa::path(
    post,
    path = "/api/workflow/{session_id}/reject",
    tag = "workflow",
    params(("session_id" = String, Path, description = "Workflow session id"), DecisionQuery),
    responses(
        (status = 200, description = "Plan rejected", body = DecisionResponse),
        (status = 404, description = "Workflow not found")
    )
)]
pub async fn reject_workflow(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<DecisionQuery>,
) -> Result<Json<DecisionResponse>, ApiError> {
    state.service.reject(&session_id, query.comments).await?;
    Ok(Json(DecisionResponse {
        status: "rejected".to_string(),
        session_id,
    }))
}

/// Current state and telemetry of a run
#[utoipa::path(
    get,
    path = "/api/workflow/{session_id}",
    tag = "workflow",
    params(("session_id" = String, Path, description = "Workflow session id")),
    responses(
        (status = 200, description = "Workflow status", body = WorkflowStatusResponse),
        (status = 404, description = "Workflow not found")
    )
)]
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<WorkflowStatusResponse>, ApiError> {
    let status = state.service.status(&session_id).await?;
    Ok(Json(WorkflowStatusResponse {
        session_id: status.session_id,
        state: status.state,
        telemetry: status.telemetry,
    }))
}

/// Telemetry snapshot of a run
#[utoipa::path(
    get,
    path = "/api/telemetry/{session_id}",
    tag = "workflow",
    params(("session_id" = String, Path, description = "Workflow session id")),
    responses(
        (status = 200, description = "Telemetry snapshot"),
        (status = 404, description = "Workflow not found")
    )
)]
pub async fn get_telemetry(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TelemetryMetrics>, ApiError> {
    let telemetry = state.service.telemetry(&session_id).await?;
    Ok(Json((*telemetry).clone()))
}

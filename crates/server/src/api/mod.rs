//! # HTTP API
//!
//! Router, OpenAPI document and error mapping.

pub mod workflow;
pub mod ws;

use axum::{
    body::Body,
    extract::State,
    http::{header, Response, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};

use planner_core::{PlannerError, StageId};

use crate::AppState;

/// Build the full application router.
///
/// Cross-origin requests are allowed from any origin.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/workflow", workflow::workflow_routes())
        .route("/api/telemetry/:session_id", get(workflow::get_telemetry))
        .route("/api/agents", get(agents))
        .route("/api/openapi.json", get(serve_openapi))
        .route("/ws/:session_id", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Errors ===

/// Boundary error rendered as `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError(PlannerError);

impl From<PlannerError> for ApiError {
    fn from(err: PlannerError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PlannerError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            PlannerError::LiveModeUnavailable => StatusCode::BAD_REQUEST,
            e if e.is_validation() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (
            status,
            Json(serde_json::json!({ "detail": self.0.to_string() })),
        )
            .into_response()
    }
}

// === Service info ===

#[derive(Serialize, ToSchema)]
pub struct ServiceInfo {
    name: String,
    version: String,
    docs: String,
    health: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    service: String,
    version: String,
    active_workflows: usize,
    active_connections: usize,
}

#[derive(Serialize, ToSchema)]
pub struct AgentInfo {
    id: String,
    name: String,
    description: String,
    tool: String,
}

#[derive(Serialize, ToSchema)]
pub struct AgentsResponse {
    agents: Vec<AgentInfo>,
    workflow_type: String,
    human_in_loop: bool,
}

/// Service information
#[utoipa::path(
    get,
    path = "/",
    tag = "service",
    responses((status = 200, description = "Service information", body = ServiceInfo))
)]
async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "Capacity Planner API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs: "/api/openapi.json".to_string(),
        health: "/health".to_string(),
    })
}

/// Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "service",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "capacity-planner".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_workflows: state.service.active_workflows().await,
        active_connections: state.service.hub().connection_count().await,
    })
}

/// Stages of the workflow, for UI display
#[utoipa::path(
    get,
    path = "/api/agents",
    tag = "service",
    responses((status = 200, description = "Pipeline stages", body = AgentsResponse))
)]
async fn agents() -> Json<AgentsResponse> {
    let agents = StageId::ALL
        .iter()
        .map(|id| {
            let d = id.descriptor();
            AgentInfo {
                id: id.as_str().to_string(),
                name: d.name.to_string(),
                description: d.description.to_string(),
                tool: d.tool.to_string(),
            }
        })
        .collect();
    Json(AgentsResponse {
        agents,
        workflow_type: "sequential".to_string(),
        human_in_loop: true,
    })
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Capacity Planner API",
        version = "1.0.0",
        description = "Sequential capacity planning workflow with a human approval checkpoint"
    ),
    paths(
        root,
        health,
        agents,
        workflow::start_workflow,
        workflow::approve_workflow,
        workflow::reject_workflow,
        workflow::get_workflow,
        workflow::get_telemetry
    ),
    components(schemas(
        ServiceInfo,
        HealthResponse,
        AgentInfo,
        AgentsResponse,
        workflow::StartWorkflowRequest,
        workflow::StartWorkflowResponse,
        workflow::DecisionResponse,
        workflow::WorkflowStatusResponse
    )),
    tags(
        (name = "service", description = "Service metadata"),
        (name = "workflow", description = "Workflow lifecycle and approval")
    )
)]
pub struct ApiDoc;

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(spec))
        .unwrap_or_default()
}

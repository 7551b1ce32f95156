//! Capacity Planner Server
//!
//! Axum server exposing the capacity planning workflow over REST and a
//! per-session WebSocket feed. The `run` subcommand drives one workflow
//! in-process and prints the live frames as JSON lines.

mod api;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use planner_core::protocol::ServerMessage;
use planner_core::{
    Connection, ConnectionHub, PlannerConfig, PlannerMode, WorkflowRequest, WorkflowService,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkflowService>,
}

impl AppState {
    pub fn new(config: PlannerConfig) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        Self {
            service: Arc::new(WorkflowService::new(config, hub)),
        }
    }
}

#[derive(Parser, Clone)]
#[command(author, version, about = "Capacity Planner - multi-stage planning with human approval")]
struct Args {
    /// Config file (defaults to .planner/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP + WebSocket server (default)
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
    /// Run one demo workflow in-process and print every frame
    Run {
        /// First day of the planning period (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,
        /// Last day of the planning period (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
        /// Hub to plan for
        #[arg(long, default_value = planner_core::models::DEFAULT_HUB)]
        hub: String,
        /// Reject the plan with these comments instead of approving it
        #[arg(long)]
        reject: Option<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("planner=info,capacity_planner=info")),
        )
        .with_target(true)
        .init();
}

async fn run_server(config: PlannerConfig, host: String, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(config);
    let service = Arc::clone(&state.service);
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, live = service.live_available(), "capacity planner listening");
    tracing::info!("REST: /api/workflow/start, /api/workflow/:id, /api/telemetry/:id, /api/agents");
    tracing::info!("WebSocket: /ws/:session_id");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    service.shutdown().await;
    Ok(())
}

/// Drive one workflow and print each frame; resolves the checkpoint itself
async fn run_once(
    config: PlannerConfig,
    request: WorkflowRequest,
    reject: Option<String>,
) -> anyhow::Result<()> {
    let hub = Arc::new(ConnectionHub::new());
    let service = WorkflowService::new(config, Arc::clone(&hub));

    let session_id = uuid::Uuid::new_v4().to_string();
    let (connection, mut frames) = Connection::channel();
    hub.register(connection, Some(&session_id)).await;

    service
        .start(request, PlannerMode::Demo, Some(session_id.clone()))
        .await?;

    while let Some(frame) = frames.recv().await {
        println!("{}", frame);
        match serde_json::from_str::<ServerMessage>(&frame)? {
            ServerMessage::ApprovalRequest { .. } => match &reject {
                Some(comments) => service.reject(&session_id, comments.clone()).await?,
                None => service.approve(&session_id, "").await?,
            },
            ServerMessage::WorkflowComplete { .. } | ServerMessage::Error { .. } => {
                // The trailing telemetry frame follows the terminal one
                if let Some(frame) = frames.recv().await {
                    println!("{}", frame);
                }
                break;
            }
            _ => {}
        }
    }

    service.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = PlannerConfig::load(args.config.as_deref()).await?;

    match args.command {
        Some(CliCommand::Run {
            from,
            to,
            hub,
            reject,
        }) => {
            let request = WorkflowRequest::new(from, to, hub)?;
            run_once(config, request, reject).await
        }
        Some(CliCommand::Serve { host, port }) => run_server(config, host, port).await,
        None => run_server(config, "127.0.0.1".to_string(), 8000).await,
    }
}

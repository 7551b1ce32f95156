//! Background task that runs an orchestrator and forwards its events to the
//! session's live channels, each followed by a telemetry snapshot.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::hub::ConnectionHub;
use crate::models::WorkflowRequest;
use crate::protocol::ServerMessage;

use super::events::WorkflowEvent;
use super::orchestrator::Orchestrator;

/// Run `orchestrator` to completion, publishing through `hub`
pub async fn drive(orchestrator: Arc<Orchestrator>, request: WorkflowRequest, hub: Arc<ConnectionHub>) {
    let session_id = orchestrator.session_id().to_string();
    let (tx, mut rx) = mpsc::channel::<WorkflowEvent>(orchestrator.config().event_buffer);

    let producer = orchestrator.execute(request, tx);
    let forwarder = async {
        while let Some(event) = rx.recv().await {
            publish(&hub, &session_id, &event, &orchestrator).await;
        }
    };

    let (outcome, ()) = tokio::join!(producer, forwarder);
    match outcome {
        Ok(state) => tracing::info!(session_id = %session_id, state = %state, "workflow driver finished"),
        Err(e) => tracing::warn!(session_id = %session_id, error = %e, "workflow driver did not run"),
    }
}

async fn publish(hub: &ConnectionHub, session_id: &str, event: &WorkflowEvent, orchestrator: &Orchestrator) {
    send(hub, session_id, &ServerMessage::from(event)).await;
    // Taken after the event was produced, so it already includes that stage
    let telemetry = ServerMessage::Telemetry {
        payload: (*orchestrator.telemetry()).clone(),
    };
    send(hub, session_id, &telemetry).await;
}

pub(crate) async fn send(hub: &ConnectionHub, session_id: &str, message: &ServerMessage) -> usize {
    match message.to_json() {
        Ok(json) => hub.send_to_session(session_id, &json).await,
        Err(e) => {
            tracing::error!(session_id, error = %e, "failed to serialize frame");
            0
        }
    }
}

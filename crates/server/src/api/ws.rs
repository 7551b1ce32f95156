//! Per-session WebSocket feed.
//!
//! Each socket is registered with the connection hub under the session id in
//! the path. A writer task drains the connection's channel into the socket;
//! the read loop handles `ping`, `approve` and `reject` frames.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use planner_core::protocol::{ClientMessage, ServerMessage};
use planner_core::{Connection, WorkflowService};

use crate::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection = Connection::new(tx.clone());
    let connection_id = connection.id();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                debug!("websocket send failed, client disconnected");
                break;
            }
        }
    });

    // The ack goes out before any workflow frame can reach this connection
    reply(&tx, &ServerMessage::connected(&session_id));
    state
        .service
        .hub()
        .register(connection, Some(&session_id))
        .await;
    info!(session_id = %session_id, connection_id = %connection_id, "websocket connected");

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "websocket error");
                break;
            }
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(message) => handle_client_message(message, &session_id, &tx, &state.service).await,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "unparseable client frame");
                reply(&tx, &ServerMessage::error(format!("Invalid message: {}", e)));
            }
        }
    }

    state.service.hub().unregister(connection_id).await;
    send_task.abort();
    info!(session_id = %session_id, connection_id = %connection_id, "websocket closed");
}

async fn handle_client_message(
    message: ClientMessage,
    session_id: &str,
    tx: &mpsc::UnboundedSender<String>,
    service: &WorkflowService,
) {
    let outcome = match message {
        ClientMessage::Ping => {
            reply(tx, &ServerMessage::Pong);
            return;
        }
        ClientMessage::Approve { comments } => service.approve(session_id, comments).await,
        // A rejection over the live channel starts the run over
        ClientMessage::Reject { comments } => {
            info!(session_id, comments = %comments, "plan rejected, re-running workflow");
            service.rerun(session_id).await
        }
    };
    if let Err(e) = outcome {
        reply(tx, &ServerMessage::error(e.to_string()));
    }
}

/// Send a frame to this socket only
fn reply(tx: &mpsc::UnboundedSender<String>, message: &ServerMessage) {
    match message.to_json() {
        Ok(json) => {
            if tx.send(json).is_err() {
                debug!("reply dropped, connection already closed");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize reply"),
    }
}

//! # Connection Hub
//!
//! Fan-out registry for live channels. Each connection is an unbounded
//! sender of serialized frames, drained by its own writer task; a connection
//! subscribes to at most one session.
//!
//! Sends snapshot the subscribers under the read lock and deliver outside
//! it. Connections whose receiver is gone are unregistered afterwards.

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Sending half of one client's live channel
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

impl Connection {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// A connection plus the receiver its writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: &str) -> bool {
        self.tx.send(message.to_string()).is_ok()
    }
}

struct Entry {
    connection: Connection,
    session_id: Option<String>,
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Entry>,
    sessions: HashMap<String, HashSet<ConnectionId>>,
}

impl HubState {
    fn detach(&mut self, id: ConnectionId, session_id: &str) {
        if let Some(subscribers) = self.sessions.get_mut(session_id) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                self.sessions.remove(session_id);
            }
        }
    }
}

#[derive(Default)]
pub struct ConnectionHub {
    state: RwLock<HubState>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, optionally subscribed to a session.
    ///
    /// Registering the same connection again is a no-op unless the session
    /// differs, in which case it moves to the new session.
    pub async fn register(&self, connection: Connection, session_id: Option<&str>) {
        let id = connection.id();
        let mut state = self.state.write().await;

        let previous = state
            .connections
            .get(&id)
            .and_then(|entry| entry.session_id.clone());
        if let Some(previous) = previous.as_deref() {
            if Some(previous) != session_id {
                state.detach(id, previous);
            }
        }

        if let Some(session_id) = session_id {
            state
                .sessions
                .entry(session_id.to_string())
                .or_default()
                .insert(id);
        }
        state.connections.insert(
            id,
            Entry {
                connection,
                session_id: session_id.map(str::to_string),
            },
        );

        tracing::debug!(
            connection_id = %id,
            session_id = session_id.unwrap_or("-"),
            total = state.connections.len(),
            "connection registered"
        );
    }

    /// Remove a connection and drop its session entry if that empties it
    pub async fn unregister(&self, id: ConnectionId) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.connections.remove(&id) {
            if let Some(session_id) = entry.session_id.as_deref() {
                state.detach(id, session_id);
            }
            tracing::debug!(connection_id = %id, "connection unregistered");
        }
    }

    /// Deliver to every subscriber of `session_id`; returns the delivered count
    pub async fn send_to_session(&self, session_id: &str, message: &str) -> usize {
        let targets: Vec<Connection> = {
            let state = self.state.read().await;
            match state.sessions.get(session_id) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| state.connections.get(id))
                    .map(|entry| entry.connection.clone())
                    .collect(),
                None => return 0,
            }
        };
        self.deliver(targets, message).await
    }

    /// Deliver to every registered connection
    pub async fn broadcast(&self, message: &str) -> usize {
        let targets: Vec<Connection> = self
            .state
            .read()
            .await
            .connections
            .values()
            .map(|entry| entry.connection.clone())
            .collect();
        self.deliver(targets, message).await
    }

    async fn deliver(&self, targets: Vec<Connection>, message: &str) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;
        for connection in &targets {
            if connection.send(message) {
                delivered += 1;
            } else {
                dead.push(connection.id());
            }
        }

        for id in dead {
            tracing::debug!(connection_id = %id, "dropping closed connection");
            self.unregister(id).await;
        }
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn subscriber_count(&self, session_id: &str) -> usize {
        self.state
            .read()
            .await
            .sessions
            .get(session_id)
            .map_or(0, HashSet::len)
    }

    /// Forget every connection.
    ///
    /// A writer whose only sender lived in the hub sees its channel close.
    /// Socket handlers keep their own sender and end when the client disconnects.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.connections.clear();
        state.sessions.clear();
    }
}

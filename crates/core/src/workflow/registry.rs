//! # Session Registry
//!
//! Maps a session id to its live orchestrator, the request it was started
//! with and the task driving it. A session owns one orchestrator at a time;
//! replacing it aborts the previous driver.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

use crate::config::PlannerMode;
use crate::error::{PlannerError, Result};
use crate::models::WorkflowRequest;

use super::orchestrator::Orchestrator;

/// What the registry knows about one session
#[derive(Debug, Clone)]
pub struct Session {
    pub orchestrator: Arc<Orchestrator>,
    /// Original request, reused when the session is re-run
    pub request: WorkflowRequest,
    pub mode: PlannerMode,
}

struct Slot {
    session: Session,
    driver: Option<AbortHandle>,
}

impl Slot {
    fn abort_driver(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    slots: RwLock<HashMap<String, Slot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing and aborting any earlier one with the same id
    pub async fn insert(&self, session_id: &str, session: Session) {
        let mut slots = self.slots.write().await;
        let previous = slots.insert(
            session_id.to_string(),
            Slot {
                session,
                driver: None,
            },
        );
        if let Some(mut previous) = previous {
            tracing::info!(session_id, "replacing existing session");
            previous.abort_driver();
        }
    }

    pub async fn get(&self, session_id: &str) -> Result<Session> {
        self.slots
            .read()
            .await
            .get(session_id)
            .map(|slot| slot.session.clone())
            .ok_or_else(|| PlannerError::SessionNotFound(session_id.to_string()))
    }

    /// Swap in a fresh orchestrator, keeping the stored request and mode
    pub async fn replace(
        &self,
        session_id: &str,
        orchestrator: Arc<Orchestrator>,
    ) -> Result<Session> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(session_id)
            .ok_or_else(|| PlannerError::SessionNotFound(session_id.to_string()))?;
        slot.abort_driver();
        slot.session.orchestrator = orchestrator;
        Ok(slot.session.clone())
    }

    /// Record the task driving `orchestrator`.
    ///
    /// If the session has moved on to another orchestrator in the meantime the
    /// driver is stale and is aborted instead.
    pub async fn attach_driver(
        &self,
        session_id: &str,
        orchestrator: &Arc<Orchestrator>,
        driver: AbortHandle,
    ) -> bool {
        let mut slots = self.slots.write().await;
        match slots.get_mut(session_id) {
            Some(slot) if Arc::ptr_eq(&slot.session.orchestrator, orchestrator) => {
                slot.abort_driver();
                slot.driver = Some(driver);
                true
            }
            _ => {
                driver.abort();
                false
            }
        }
    }

    /// Abort every driver and forget every session
    pub async fn clear(&self) -> usize {
        let mut slots = self.slots.write().await;
        let count = slots.len();
        for slot in slots.values_mut() {
            slot.abort_driver();
        }
        slots.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}

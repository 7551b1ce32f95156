//! Single-slot approval signal.
//!
//! The decision is stored in a `watch` channel, so a decision made before the
//! orchestrator starts waiting is still observed, and repeated decisions
//! simply overwrite each other.

use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub comments: String,
}

#[derive(Debug)]
pub struct ApprovalGate {
    slot: watch::Sender<Option<ApprovalDecision>>,
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalGate {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Store a decision; last write wins
    pub fn resolve(&self, approved: bool, comments: impl Into<String>) {
        self.slot.send_replace(Some(ApprovalDecision {
            approved,
            comments: comments.into(),
        }));
    }

    /// Wait for a decision. `None` means the timeout elapsed first.
    pub async fn wait(&self, timeout: Duration) -> Option<ApprovalDecision> {
        let mut rx = self.slot.subscribe();
        let decision = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(decision)) => (*decision).clone(),
            // The sender lives in `self`, so the channel cannot close while we wait
            Ok(Err(_)) | Err(_) => None,
        };
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_resolve_releases_waiter() {
        let gate = Arc::new(ApprovalGate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait(Duration::from_secs(300)).await })
        };
        tokio::time::sleep(Duration::from_secs(10)).await;
        gate.resolve(true, "ship it");

        let decision = waiter.await.unwrap().unwrap();
        assert!(decision.approved);
        assert_eq!(decision.comments, "ship it");
    }

    #[tokio::test]
    async fn test_wait_pending_until_resolved() {
        let gate = ApprovalGate::new();
        let mut wait = tokio_test::task::spawn(gate.wait(Duration::from_secs(300)));
        tokio_test::assert_pending!(wait.poll());

        gate.resolve(true, "");
        assert!(wait.is_woken());
        let decision = tokio_test::assert_ready!(wait.poll());
        assert!(decision.unwrap().approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_decision_is_observed() {
        let gate = ApprovalGate::new();
        gate.resolve(false, "too early");
        let decision = gate.wait(Duration::from_secs(1)).await.unwrap();
        assert!(!decision.approved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins() {
        let gate = ApprovalGate::new();
        gate.resolve(false, "first");
        gate.resolve(true, "second");
        assert_eq!(
            gate.wait(Duration::from_secs(1)).await,
            Some(ApprovalDecision {
                approved: true,
                comments: "second".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let gate = ApprovalGate::new();
        assert_eq!(gate.wait(Duration::from_secs(300)).await, None);
    }
}

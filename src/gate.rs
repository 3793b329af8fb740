//! Human approval gate for tasks that pause before completing.
//!
//! The gate is an injectable capability: production code plugs in a real
//! approval channel (CLI prompt, queue, webhook), tests plug in a
//! deterministic stub. The scheduler awaits the gate without blocking
//! other ready tasks and bounds every wait with the configured timeout.

use crate::core::task::TaskId;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// External approval capability consulted for tasks parked in
/// `waiting_human`.
#[async_trait]
pub trait HumanGate: Send + Sync {
    /// Suspend until a decision for `task_id` arrives.
    ///
    /// Returns `true` on approval, `false` on denial. Errors mean the
    /// approval channel itself broke, which the scheduler treats as
    /// denial.
    async fn request_approval(&self, task_id: &TaskId) -> Result<bool>;
}

/// Deterministic gate returning a fixed decision, optionally after a
/// fixed delay. Used by the demo workflow and by tests.
#[derive(Debug, Clone)]
pub struct AutoGate {
    approve: bool,
    delay: Option<Duration>,
}

impl AutoGate {
    /// A gate that approves every request immediately.
    pub fn approving() -> Self {
        Self {
            approve: true,
            delay: None,
        }
    }

    /// A gate that denies every request immediately.
    pub fn denying() -> Self {
        Self {
            approve: false,
            delay: None,
        }
    }

    /// Add a fixed delay before each decision.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl HumanGate for AutoGate {
    async fn request_approval(&self, _task_id: &TaskId) -> Result<bool> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.approve)
    }
}

/// An approval request forwarded to an external decision channel.
///
/// The consumer answers through `reply`; dropping it counts as a broken
/// channel, not a denial.
#[derive(Debug)]
pub struct ApprovalRequest {
    /// The task awaiting a decision.
    pub task_id: TaskId,
    /// One-shot slot for the decision.
    pub reply: oneshot::Sender<bool>,
}

/// Gate that forwards each request to an mpsc consumer (a CLI prompt
/// loop, a queue bridge, a UI).
pub struct ChannelGate {
    requests: mpsc::Sender<ApprovalRequest>,
}

impl ChannelGate {
    /// Create a gate and the receiving end its consumer reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { requests: tx }, rx)
    }
}

#[async_trait]
impl HumanGate for ChannelGate {
    async fn request_approval(&self, task_id: &TaskId) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(ApprovalRequest {
                task_id: task_id.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::GateClosed(task_id.clone()))?;

        reply_rx
            .await
            .map_err(|_| Error::GateClosed(task_id.clone()))
    }
}

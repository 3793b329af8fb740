//! Task data model for the workflow graph.
//!
//! Tasks are the atomic units of work in a run. Each task tracks its
//! declared dependencies, lifecycle status, result, and timing.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier for a task within a workflow.
///
/// Task ids are caller-supplied string keys ("analyze", "notify", ...),
/// unique within one registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The JSON value a task body produces on success.
pub type TaskOutput = serde_json::Value;

/// A task body's own failure. Opaque to the orchestrator; only the
/// message survives, wrapped with the originating task id.
pub type BodyError = Box<dyn std::error::Error + Send + Sync>;

/// A zero-argument async unit of work supplied by the caller.
///
/// Bodies are opaque to the orchestrator and must not touch registry
/// state; they produce an output value or fail.
pub type TaskBody =
    Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<TaskOutput, BodyError>> + Send + Sync>;

/// Wrap an async closure into a [`TaskBody`].
pub fn body<F, Fut>(f: F) -> TaskBody
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = std::result::Result<TaskOutput, BodyError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Task status in its lifecycle.
///
/// A task moves only along `pending -> running -> {success, failed}`,
/// with an optional detour `running -> waiting_human -> {success, failed}`.
/// `pending -> failed` is reachable solely through run-level cancellation.
/// No task re-enters `pending` once left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task registered but not yet executed.
    #[default]
    Pending,
    /// Task body is currently executing.
    Running,
    /// Task finished successfully.
    Success,
    /// Task failed with an error.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// Task body finished; the task is parked awaiting human approval.
    WaitingHuman,
}

impl TaskStatus {
    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_become(&self, next: &TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed { .. })
                | (Running, Success)
                | (Running, Failed { .. })
                | (Running, WaitingHuman)
                | (WaitingHuman, Success)
                | (WaitingHuman, Failed { .. })
        )
    }

    /// Check if this is a terminal state (Success or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed { .. })
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::WaitingHuman => write!(f, "waiting_human"),
        }
    }
}

/// A single task record in the registry.
///
/// The executable body lives beside this record in the registry; the
/// record itself is plain data and serializes into run reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable summary of what the task does.
    #[serde(default)]
    pub description: String,
    /// Task ids that must reach `success` before this task may run.
    pub dependencies: Vec<TaskId>,
    /// Whether this task parks in `waiting_human` after its body succeeds.
    pub requires_approval: bool,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Output recorded on success.
    pub result: Option<TaskOutput>,
    /// When the task was registered.
    pub created_at: DateTime<Utc>,
    /// When the task body started executing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task with the given id and dependencies.
    pub fn new(id: impl Into<TaskId>, dependencies: Vec<TaskId>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            dependencies,
            requires_approval: false,
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Attach a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark this task as requiring human approval after its body runs.
    pub fn with_approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Transition to Running and record the start time.
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Transition to Success, recording the result and finish time.
    pub fn succeed(&mut self, result: TaskOutput) {
        self.status = TaskStatus::Success;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
    }

    /// Transition to Failed with an error message.
    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.finished_at = Some(Utc::now());
    }

    /// Park the task pending human approval, stashing the body's result.
    pub fn park(&mut self, result: TaskOutput) {
        self.status = TaskStatus::WaitingHuman;
        self.result = Some(result);
    }

    /// Complete an approved task, keeping the result stashed by `park`.
    pub fn approve(&mut self) {
        self.status = TaskStatus::Success;
        self.finished_at = Some(Utc::now());
    }

    /// Check if the task is in a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

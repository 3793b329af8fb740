//! Run report types: the terminal classification of one workflow run.

use crate::core::task::{TaskId, TaskOutput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for a workflow run.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new unique run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Why an unexecuted task can never become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreachableCause {
    /// A transitive dependency permanently failed.
    FailedDependency,
    /// A transitive dependency id was never registered.
    UnknownDependency,
}

impl std::fmt::Display for UnreachableCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnreachableCause::FailedDependency => write!(f, "failed_dependency"),
            UnreachableCause::UnknownDependency => write!(f, "unknown_dependency"),
        }
    }
}

/// Final per-task classification at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "disposition")]
pub enum TaskDisposition {
    /// Task executed and succeeded.
    Succeeded,
    /// Task executed (or was cancelled) and failed.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// Task never ran and can never become ready.
    Unreachable {
        /// Why the task is permanently blocked.
        cause: UnreachableCause,
    },
    /// Task never ran although nothing permanently blocks it: it was
    /// never reached from the start set, or the run deadlocked.
    NeverRan,
}

impl std::fmt::Display for TaskDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskDisposition::Succeeded => write!(f, "succeeded"),
            TaskDisposition::Failed { error } => write!(f, "failed: {}", error),
            TaskDisposition::Unreachable { cause } => write!(f, "unreachable: {}", cause),
            TaskDisposition::NeverRan => write!(f, "never_ran"),
        }
    }
}

/// Terminal classification for a whole run.
///
/// Quiescence is never ambiguous: an empty queue with unfinished tasks
/// is reported as deadlocked, not silently conflated with completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every registered task reached success.
    Completed,
    /// The run quiesced with failures; every non-terminal task is
    /// explained by a failed or unknown dependency.
    CompletedWithFailures,
    /// The run quiesced with tasks that never ran and are not explained
    /// by any failure or unknown dependency.
    Deadlocked,
    /// The run was cancelled before quiescence.
    Cancelled,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::CompletedWithFailures => write!(f, "completed_with_failures"),
            RunOutcome::Deadlocked => write!(f, "deadlocked"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The record of one workflow run: per-task dispositions, collected
/// results, and the overall outcome. Owned by the scheduler while the
/// run is live; read-only afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: RunId,
    /// Overall terminal classification.
    pub outcome: RunOutcome,
    /// Final disposition for every registered task.
    pub dispositions: BTreeMap<TaskId, TaskDisposition>,
    /// Outputs of tasks that succeeded.
    pub results: BTreeMap<TaskId, TaskOutput>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Number of tasks with the Succeeded disposition.
    pub fn succeeded_count(&self) -> usize {
        self.dispositions
            .values()
            .filter(|d| matches!(d, TaskDisposition::Succeeded))
            .count()
    }

    /// Number of tasks with the Failed disposition.
    pub fn failed_count(&self) -> usize {
        self.dispositions
            .values()
            .filter(|d| matches!(d, TaskDisposition::Failed { .. }))
            .count()
    }

    /// Number of tasks reported unreachable.
    pub fn unreachable_count(&self) -> usize {
        self.dispositions
            .values()
            .filter(|d| matches!(d, TaskDisposition::Unreachable { .. }))
            .count()
    }

    /// Disposition for one task, if it was registered.
    pub fn disposition(&self, id: &TaskId) -> Option<&TaskDisposition> {
        self.dispositions.get(id)
    }
}

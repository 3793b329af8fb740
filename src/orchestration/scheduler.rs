//! Scheduler: drives a registered task graph to quiescence.
//!
//! The scheduler repeatedly scans its work queue for ready tasks,
//! executes each ready batch concurrently, resolves human-gated tasks
//! through the injected approval capability, and classifies every
//! registered task when the run quiesces. Queue and status mutations
//! are serialized through a single `Arc<RwLock<TaskRegistry>>`; task
//! bodies run outside the lock.

use crate::config::Config;
use crate::core::registry::TaskRegistry;
use crate::core::task::{TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::gate::HumanGate;
use crate::orchestration::report::{
    RunId, RunOutcome, RunReport, TaskDisposition, UnreachableCause,
};
use crate::{glog, glog_debug, glog_error, glog_warn};
use chrono::Utc;
use futures::FutureExt;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Events emitted for task lifecycle changes during a run.
///
/// These let external components (a CLI progress display, a log
/// follower) react to state changes without polling. Emission is
/// best-effort: a full channel or dropped receiver never stalls the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A task's body has started executing.
    TaskStarted {
        /// The task that started.
        task_id: TaskId,
    },
    /// A task reached `success`.
    TaskCompleted {
        /// The task that completed.
        task_id: TaskId,
    },
    /// A task reached `failed`.
    TaskFailed {
        /// The task that failed.
        task_id: TaskId,
        /// Error message describing the failure.
        error: String,
    },
    /// A parked task's approval was requested from the gate.
    ApprovalRequested {
        /// The task awaiting a decision.
        task_id: TaskId,
    },
    /// The gate decided (or timed out) on a parked task.
    ApprovalResolved {
        /// The task the decision is for.
        task_id: TaskId,
        /// Whether the task was approved.
        approved: bool,
    },
    /// The run quiesced or was cancelled.
    RunFinished {
        /// The run that finished.
        run_id: RunId,
        /// Its terminal classification.
        outcome: RunOutcome,
    },
}

/// Scheduler for one workflow run over a task registry.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tokio::sync::{mpsc, RwLock};
/// use gantry::config::Config;
/// use gantry::core::TaskRegistry;
/// use gantry::gate::AutoGate;
/// use gantry::orchestration::Scheduler;
///
/// let registry = Arc::new(RwLock::new(TaskRegistry::new()));
/// let (event_tx, _event_rx) = mpsc::channel(100);
/// let mut scheduler = Scheduler::new(registry, Arc::new(AutoGate::approving()), Config::default(), event_tx);
/// let report = scheduler.run(vec!["analyze".into()]).await?;
/// ```
pub struct Scheduler {
    /// The task registry driven by this run.
    registry: Arc<RwLock<TaskRegistry>>,
    /// Approval capability for tasks parked in `waiting_human`.
    gate: Arc<dyn HumanGate>,
    /// Run configuration (parallelism cap, approval timeout).
    config: Config,
    /// Channel for emitting scheduler events.
    event_tx: mpsc::Sender<SchedulerEvent>,
    /// Run-level cancellation.
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(
        registry: Arc<RwLock<TaskRegistry>>,
        gate: Arc<dyn HumanGate>,
        config: Config,
        event_tx: mpsc::Sender<SchedulerEvent>,
    ) -> Self {
        Self {
            registry,
            gate,
            config,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Token for cancelling this run from outside.
    ///
    /// Cancelling marks every non-terminal task failed and ends the run
    /// with outcome `cancelled`. In-flight bodies are allowed to finish
    /// their current batch; waits on the gate are interrupted.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the workflow from the given start task ids to quiescence.
    ///
    /// Setup problems (unknown start id, dependency cycle) are returned
    /// as errors before anything executes. Task failures are never
    /// errors: they are contained to the task and its downstream and
    /// reported through the returned [`RunReport`].
    pub async fn run(&mut self, start: Vec<TaskId>) -> Result<RunReport> {
        let run_id = RunId::new();
        let started_at = Utc::now();

        // Setup validation: cycles and unknown start ids are fatal.
        {
            let registry = self.registry.read().await;
            registry.validate()?;
            for id in &start {
                if !registry.contains(id) {
                    return Err(Error::UnknownTask(id.clone()));
                }
            }
        }

        glog!(
            "Run {} starting with {} start task(s)",
            run_id.short(),
            start.len()
        );

        // Work queue, idempotent: `queued` guards against double enqueue,
        // `executed` against double execution.
        let mut queue: Vec<TaskId> = Vec::new();
        let mut queued: HashSet<TaskId> = HashSet::new();
        let mut executed: HashSet<TaskId> = HashSet::new();
        for id in start {
            if queued.insert(id.clone()) {
                queue.push(id);
            }
        }

        let cancelled = loop {
            if self.cancel.is_cancelled() {
                self.fail_unfinished("run cancelled").await;
                break true;
            }

            // Partition the queue into ready / not-ready.
            let ready: Vec<TaskId> = {
                let registry = self.registry.read().await;
                queue
                    .iter()
                    .filter(|id| !executed.contains(*id) && registry.is_ready(id))
                    .cloned()
                    .collect()
            };

            if ready.is_empty() {
                let waiting = self.registry.read().await.waiting_tasks();
                if waiting.is_empty() {
                    // Quiescent: nothing ready, nothing awaiting approval.
                    break false;
                }
                glog_debug!("No ready tasks; resolving {} approval(s)", waiting.len());
                for id in waiting {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    self.resolve_approval(&id, &mut queue, &mut queued, &executed)
                        .await?;
                }
                continue;
            }

            glog_debug!("Scheduling pass: {} ready task(s)", ready.len());

            // Execute the ready set concurrently, capped by max_parallel.
            for batch in ready.chunks(self.config.max_parallel.max(1)) {
                self.execute_batch(batch, &mut queue, &mut queued, &mut executed)
                    .await?;
            }

            queue.retain(|id| !executed.contains(id));
        };

        let report = self.build_report(run_id, started_at, cancelled).await;
        glog!(
            "Run {} finished: {} ({} succeeded, {} failed, {} unreachable)",
            run_id.short(),
            report.outcome,
            report.succeeded_count(),
            report.failed_count(),
            report.unreachable_count()
        );
        self.emit(SchedulerEvent::RunFinished {
            run_id,
            outcome: report.outcome,
        });
        Ok(report)
    }

    /// Execute one batch of ready tasks concurrently and fold their
    /// outcomes back into the registry and queue.
    async fn execute_batch(
        &mut self,
        batch: &[TaskId],
        queue: &mut Vec<TaskId>,
        queued: &mut HashSet<TaskId>,
        executed: &mut HashSet<TaskId>,
    ) -> Result<()> {
        let mut join_set: JoinSet<(TaskId, std::result::Result<_, String>)> = JoinSet::new();

        for id in batch {
            let body = {
                let mut registry = self.registry.write().await;
                registry.start_task(id)?;
                registry
                    .body(id)
                    .ok_or_else(|| Error::UnknownTask(id.clone()))?
            };
            self.emit(SchedulerEvent::TaskStarted {
                task_id: id.clone(),
            });
            glog_debug!("Task {} started", id);

            let task_id = id.clone();
            join_set.spawn(async move {
                // A panicking body is that task's failure, not the run's.
                let result = match AssertUnwindSafe(body()).catch_unwind().await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(panic) => Err(panic_message(panic.as_ref())),
                };
                (task_id, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            // Panics never reach the join handle; an error here is a
            // runtime fault (task aborted or runtime shutting down).
            let (id, result) = joined.map_err(|e| Error::TaskJoin(e.to_string()))?;
            executed.insert(id.clone());

            match result {
                Ok(output) => {
                    let requires_approval = {
                        let registry = self.registry.read().await;
                        registry
                            .task(&id)
                            .map(|t| t.requires_approval)
                            .unwrap_or(false)
                    };
                    if requires_approval {
                        self.registry.write().await.park_task(&id, output)?;
                        glog!("Task {} awaiting human approval", id);
                        self.emit(SchedulerEvent::ApprovalRequested {
                            task_id: id.clone(),
                        });
                    } else {
                        self.registry.write().await.complete_task(&id, output)?;
                        glog!("Task {} succeeded", id);
                        self.emit(SchedulerEvent::TaskCompleted {
                            task_id: id.clone(),
                        });
                        self.enqueue_dependents(&id, queue, queued, executed).await;
                    }
                }
                Err(message) => {
                    // Fail-fast policy: dependents are never enqueued
                    // behind a failure. They surface as unreachable in
                    // the run report.
                    self.registry.write().await.fail_task(&id, &message)?;
                    glog_error!("Task {} failed: {}", id, message);
                    self.emit(SchedulerEvent::TaskFailed {
                        task_id: id.clone(),
                        error: message,
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolve one parked task through the gate, bounded by the
    /// configured timeout. Denial, timeout, and a broken gate channel
    /// all fail the task.
    async fn resolve_approval(
        &mut self,
        id: &TaskId,
        queue: &mut Vec<TaskId>,
        queued: &mut HashSet<TaskId>,
        executed: &HashSet<TaskId>,
    ) -> Result<()> {
        let approved = if self.config.auto_approve {
            true
        } else {
            let wait = tokio::time::timeout(
                self.config.approval_timeout(),
                self.gate.request_approval(id),
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    glog_warn!("Approval wait for {} interrupted by cancellation", id);
                    return Ok(());
                }
                outcome = wait => match outcome {
                    Ok(Ok(decision)) => decision,
                    Ok(Err(e)) => {
                        glog_warn!("Approval channel for {} broke: {}", id, e);
                        false
                    }
                    Err(_) => {
                        glog_warn!(
                            "Approval for {} timed out after {:?}, treating as denied",
                            id,
                            self.config.approval_timeout()
                        );
                        false
                    }
                },
            }
        };

        self.emit(SchedulerEvent::ApprovalResolved {
            task_id: id.clone(),
            approved,
        });

        if approved {
            self.registry.write().await.approve_task(id)?;
            glog!("Task {} approved", id);
            self.emit(SchedulerEvent::TaskCompleted {
                task_id: id.clone(),
            });
            self.enqueue_dependents(id, queue, queued, executed).await;
        } else {
            self.registry.write().await.fail_task(id, "approval denied")?;
            glog!("Task {} denied approval", id);
            self.emit(SchedulerEvent::TaskFailed {
                task_id: id.clone(),
                error: "approval denied".to_string(),
            });
        }
        Ok(())
    }

    /// Enqueue every direct dependent of `id` that has not already been
    /// queued or executed.
    async fn enqueue_dependents(
        &self,
        id: &TaskId,
        queue: &mut Vec<TaskId>,
        queued: &mut HashSet<TaskId>,
        executed: &HashSet<TaskId>,
    ) {
        let dependents = self.registry.read().await.dependents_of(id);
        for dependent in dependents {
            if !executed.contains(&dependent) && queued.insert(dependent.clone()) {
                glog_debug!("Task {} unblocked dependent {}", id, dependent);
                queue.push(dependent);
            }
        }
    }

    /// Mark every non-terminal task failed (cancellation path).
    async fn fail_unfinished(&self, reason: &str) {
        let mut registry = self.registry.write().await;
        for id in registry.unfinished_tasks() {
            if let Err(e) = registry.fail_task(&id, reason) {
                glog_warn!("Could not cancel task {}: {}", id, e);
            }
        }
    }

    /// Classify every registered task and the run as a whole.
    async fn build_report(
        &self,
        run_id: RunId,
        started_at: chrono::DateTime<Utc>,
        cancelled: bool,
    ) -> RunReport {
        let registry = self.registry.read().await;
        let mut dispositions = BTreeMap::new();
        let mut results = BTreeMap::new();

        for id in registry.task_ids() {
            let Some(task) = registry.task(id) else {
                continue;
            };
            let disposition = match &task.status {
                TaskStatus::Success => {
                    if let Some(result) = &task.result {
                        results.insert(id.clone(), result.clone());
                    }
                    TaskDisposition::Succeeded
                }
                TaskStatus::Failed { error } => TaskDisposition::Failed {
                    error: error.clone(),
                },
                // Non-terminal at quiescence: explain it or call it out.
                _ => {
                    if registry.depends_on_unknown(id) {
                        TaskDisposition::Unreachable {
                            cause: UnreachableCause::UnknownDependency,
                        }
                    } else if registry.depends_on_failure(id) {
                        TaskDisposition::Unreachable {
                            cause: UnreachableCause::FailedDependency,
                        }
                    } else {
                        TaskDisposition::NeverRan
                    }
                }
            };
            dispositions.insert(id.clone(), disposition);
        }

        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else if dispositions
            .values()
            .all(|d| matches!(d, TaskDisposition::Succeeded))
        {
            RunOutcome::Completed
        } else if dispositions
            .values()
            .any(|d| matches!(d, TaskDisposition::NeverRan))
        {
            RunOutcome::Deadlocked
        } else {
            RunOutcome::CompletedWithFailures
        };

        RunReport {
            run_id,
            outcome,
            dispositions,
            results,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Best-effort event emission: never blocks the run.
    fn emit(&self, event: SchedulerEvent) {
        let _ = self.event_tx.try_send(event);
    }
}

/// Extract a readable message from a caught panic payload.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("task body panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("task body panicked: {}", s)
    } else {
        "task body panicked".to_string()
    }
}

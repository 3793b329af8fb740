//! Task registry: the owned mapping from task id to record and body.
//!
//! The registry is the single source of truth for task state. It is an
//! explicit object handed to the scheduler (no ambient globals), and all
//! status transitions funnel through it so the lifecycle invariant is
//! enforced in one place.

use crate::core::task::{Task, TaskBody, TaskId, TaskOutput, TaskStatus};
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Registry of tasks, their bodies, and their dependency lists.
///
/// Registration is permissive about dependency ids: a dependency on an
/// unregistered task is accepted and surfaced at run end as unreachable,
/// never silently dropped. Duplicate ids are rejected outright.
pub struct TaskRegistry {
    /// Task records keyed by id.
    tasks: HashMap<TaskId, Task>,
    /// Executable bodies keyed by id.
    bodies: HashMap<TaskId, TaskBody>,
    /// Registration order, for deterministic scans and reports.
    order: Vec<TaskId>,
}

impl TaskRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            bodies: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a task with its body and dependency list.
    ///
    /// Fails with [`Error::DuplicateTask`] if the id is already taken;
    /// the existing task is left untouched. The new task starts `pending`.
    pub fn register(
        &mut self,
        id: impl Into<TaskId>,
        body: TaskBody,
        dependencies: Vec<TaskId>,
    ) -> Result<()> {
        self.register_task(Task::new(id, dependencies), body)
    }

    /// Register a task that parks for human approval after its body runs.
    pub fn register_gated(
        &mut self,
        id: impl Into<TaskId>,
        body: TaskBody,
        dependencies: Vec<TaskId>,
    ) -> Result<()> {
        self.register_task(Task::new(id, dependencies).with_approval(), body)
    }

    /// Register a pre-built task record with its body.
    pub fn register_task(&mut self, task: Task, body: TaskBody) -> Result<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(Error::DuplicateTask(task.id));
        }
        let id = task.id.clone();
        self.tasks.insert(id.clone(), task);
        self.bodies.insert(id.clone(), body);
        self.order.push(id);
        Ok(())
    }

    /// Get a reference to a task by its id.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Get the executable body for a task.
    pub fn body(&self, id: &TaskId) -> Option<TaskBody> {
        self.bodies.get(id).cloned()
    }

    /// Check if the registry contains a task.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All task ids in registration order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }

    // ========== Status tracking ==========

    /// Current status of a task, or [`Error::UnknownTask`].
    pub fn status(&self, id: &TaskId) -> Result<TaskStatus> {
        self.tasks
            .get(id)
            .map(|t| t.status.clone())
            .ok_or_else(|| Error::UnknownTask(id.clone()))
    }

    /// Overwrite a task's status, enforcing the lifecycle invariant.
    ///
    /// Returns [`Error::InvalidTransition`] when the move is not on the
    /// `pending -> running -> {success, failed}` path (or the
    /// `waiting_human` detour / cancellation edge).
    pub fn set_status(&mut self, id: &TaskId, status: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTask(id.clone()))?;
        if !task.status.can_become(&status) {
            return Err(Error::InvalidTransition {
                task_id: id.clone(),
                from: task.status.clone(),
                to: status,
            });
        }
        task.status = status;
        Ok(())
    }

    /// Transition a task to Running, recording its start time.
    pub fn start_task(&mut self, id: &TaskId) -> Result<()> {
        self.task_for_transition(id, &TaskStatus::Running)?.start();
        Ok(())
    }

    /// Transition a task to Success, recording its result.
    pub fn complete_task(&mut self, id: &TaskId, result: TaskOutput) -> Result<()> {
        self.task_for_transition(id, &TaskStatus::Success)?
            .succeed(result);
        Ok(())
    }

    /// Transition a task to Failed with an error message.
    pub fn fail_task(&mut self, id: &TaskId, error: &str) -> Result<()> {
        let status = TaskStatus::Failed {
            error: error.to_string(),
        };
        self.task_for_transition(id, &status)?.fail(error);
        Ok(())
    }

    /// Complete an approved task, keeping the result stashed when it
    /// was parked.
    pub fn approve_task(&mut self, id: &TaskId) -> Result<()> {
        self.task_for_transition(id, &TaskStatus::Success)?.approve();
        Ok(())
    }

    /// Park a task in WaitingHuman with its body's result stashed.
    pub fn park_task(&mut self, id: &TaskId, result: TaskOutput) -> Result<()> {
        self.task_for_transition(id, &TaskStatus::WaitingHuman)?
            .park(result);
        Ok(())
    }

    fn task_for_transition(&mut self, id: &TaskId, to: &TaskStatus) -> Result<&mut Task> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::UnknownTask(id.clone()))?;
        if !task.status.can_become(to) {
            return Err(Error::InvalidTransition {
                task_id: id.clone(),
                from: task.status.clone(),
                to: to.clone(),
            });
        }
        Ok(task)
    }

    // ========== Scheduling queries ==========

    /// A task is eligible to run iff it is pending and every declared
    /// dependency currently has status Success. Dependencies on
    /// unregistered ids never satisfy this.
    pub fn is_ready(&self, id: &TaskId) -> bool {
        let Some(task) = self.tasks.get(id) else {
            return false;
        };
        if task.status != TaskStatus::Pending {
            return false;
        }
        task.dependencies.iter().all(|dep| {
            self.tasks
                .get(dep)
                .map(|t| t.status == TaskStatus::Success)
                .unwrap_or(false)
        })
    }

    /// Tasks that list `id` as a direct dependency, in registration order.
    pub fn dependents_of(&self, id: &TaskId) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|candidate| {
                self.tasks
                    .get(candidate)
                    .map(|t| t.dependencies.contains(id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Task ids currently parked in WaitingHuman, in registration order.
    pub fn waiting_tasks(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| {
                self.tasks
                    .get(id)
                    .map(|t| t.status == TaskStatus::WaitingHuman)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Task ids not yet in a terminal state, in registration order.
    pub fn unfinished_tasks(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| {
                self.tasks
                    .get(id)
                    .map(|t| !t.is_finished())
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Validate the dependency graph before a run.
    ///
    /// Builds a petgraph DiGraph over the registered tasks (edges only
    /// between known ids; unknown deps are a reporting concern, not a
    /// setup error) and rejects cycles with [`Error::Validation`] naming
    /// a task on the cycle.
    pub fn validate(&self) -> Result<()> {
        let mut graph: DiGraph<&TaskId, ()> = DiGraph::new();
        let mut index: HashMap<&TaskId, NodeIndex> = HashMap::new();

        for id in &self.order {
            index.insert(id, graph.add_node(id));
        }
        for id in &self.order {
            let to = index[id];
            for dep in &self.tasks[id].dependencies {
                if let Some(&from) = index.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            Error::Validation(format!(
                "Dependency cycle detected at task: {}",
                graph[cycle.node_id()]
            ))
        })?;
        Ok(())
    }

    /// Whether any task in `id`'s transitive dependency closure is
    /// unregistered.
    pub fn depends_on_unknown(&self, id: &TaskId) -> bool {
        self.walk_dependencies(id, &mut |dep| !self.tasks.contains_key(dep))
    }

    /// Whether any task in `id`'s transitive dependency closure has
    /// permanently failed.
    pub fn depends_on_failure(&self, id: &TaskId) -> bool {
        self.walk_dependencies(id, &mut |dep| {
            self.tasks
                .get(dep)
                .map(|t| matches!(t.status, TaskStatus::Failed { .. }))
                .unwrap_or(false)
        })
    }

    /// Depth-first walk over the dependency closure of `id`, returning
    /// true as soon as `pred` matches any ancestor.
    fn walk_dependencies(&self, id: &TaskId, pred: &mut dyn FnMut(&TaskId) -> bool) -> bool {
        let mut visited: HashSet<&TaskId> = HashSet::new();
        let mut stack: Vec<&TaskId> = match self.tasks.get(id) {
            Some(task) => task.dependencies.iter().collect(),
            None => return false,
        };

        while let Some(dep) = stack.pop() {
            if !visited.insert(dep) {
                continue;
            }
            if pred(dep) {
                return true;
            }
            if let Some(task) = self.tasks.get(dep) {
                stack.extend(task.dependencies.iter());
            }
        }
        false
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.len())
            .finish()
    }
}

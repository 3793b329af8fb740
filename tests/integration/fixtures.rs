//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Building registries with common graph shapes
//! - Task bodies that succeed, fail, or stall
//! - A scheduler harness wiring registry, gate, and event channel

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, RwLock};

use gantry::config::Config;
use gantry::core::{body, TaskBody, TaskId, TaskOutput, TaskRegistry};
use gantry::gate::{AutoGate, HumanGate};
use gantry::orchestration::{RunReport, Scheduler, SchedulerEvent};

/// Convert a slice of names into task ids.
pub fn ids(names: &[&str]) -> Vec<TaskId> {
    names.iter().map(|s| TaskId::from(*s)).collect()
}

/// A body that resolves immediately with the given value.
pub fn ok_body(value: serde_json::Value) -> TaskBody {
    body(move || {
        let value = value.clone();
        async move { Ok(value) }
    })
}

/// A body that fails immediately with the given message.
pub fn err_body(message: &str) -> TaskBody {
    let message = message.to_string();
    body(move || {
        let message = message.clone();
        async move {
            Err::<TaskOutput, gantry::core::BodyError>(message.into())
        }
    })
}

/// A body that panics, for failure containment tests.
pub fn panicking_body(message: &'static str) -> TaskBody {
    body(move || async move {
        panic!("{}", message);
    })
}

/// A body that sleeps before succeeding, for overlap and timing tests.
pub fn slow_body(delay: Duration, value: serde_json::Value) -> TaskBody {
    body(move || {
        let value = value.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok(value)
        }
    })
}

/// A registry, scheduler, and event receiver wired together.
pub struct RunHarness {
    pub registry: Arc<RwLock<TaskRegistry>>,
    pub scheduler: Scheduler,
    pub event_rx: mpsc::Receiver<SchedulerEvent>,
}

impl RunHarness {
    /// Harness with an always-approving gate and default config.
    pub fn new() -> Self {
        Self::with_gate(Arc::new(AutoGate::approving()), Config::default())
    }

    /// Harness with an explicit gate and config.
    pub fn with_gate(gate: Arc<dyn HumanGate>, config: Config) -> Self {
        let registry = Arc::new(RwLock::new(TaskRegistry::new()));
        let (event_tx, event_rx) = mpsc::channel(256);
        let scheduler = Scheduler::new(Arc::clone(&registry), gate, config, event_tx);
        Self {
            registry,
            scheduler,
            event_rx,
        }
    }

    /// Register a plain task whose body succeeds with its own name.
    pub async fn add_task(&self, id: &str, deps: &[&str]) {
        self.registry
            .write()
            .await
            .register(id, ok_body(json!(id)), ids(deps))
            .expect("register task");
    }

    /// Register a task whose body fails with the given message.
    pub async fn add_failing(&self, id: &str, deps: &[&str], message: &str) {
        self.registry
            .write()
            .await
            .register(id, err_body(message), ids(deps))
            .expect("register failing task");
    }

    /// Register a human-gated task whose body succeeds with its name.
    pub async fn add_gated(&self, id: &str, deps: &[&str]) {
        self.registry
            .write()
            .await
            .register_gated(id, ok_body(json!(id)), ids(deps))
            .expect("register gated task");
    }

    /// Drive the run to quiescence from the given start tasks.
    pub async fn run(&mut self, start: &[&str]) -> RunReport {
        self.scheduler.run(ids(start)).await.expect("run workflow")
    }

    /// Drain every buffered scheduler event.
    pub fn drain_events(&mut self) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Register the diamond shape: a -> (b, c) -> d.
pub async fn diamond(harness: &RunHarness) {
    harness.add_task("a", &[]).await;
    harness.add_task("b", &["a"]).await;
    harness.add_task("c", &["a"]).await;
    harness.add_task("d", &["b", "c"]).await;
}

/// Order in which tasks started, from a drained event list.
pub fn started_order(events: &[SchedulerEvent]) -> Vec<TaskId> {
    events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::TaskStarted { task_id } => Some(task_id.clone()),
            _ => None,
        })
        .collect()
}

//! End-to-end workflow runs over common graph shapes.

use std::time::Duration;

use serde_json::json;

use gantry::core::{TaskId, TaskStatus};
use gantry::orchestration::{RunOutcome, TaskDisposition};

use crate::fixtures::{ids, slow_body, started_order, diamond, RunHarness};

#[tokio::test]
async fn test_three_independent_tasks_complete() {
    let mut harness = RunHarness::new();
    harness.add_task("a", &[]).await;
    harness.add_task("b", &[]).await;
    harness.add_task("c", &[]).await;

    let report = harness.run(&["a", "b", "c"]).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.succeeded_count(), 3);
    for id in ["a", "b", "c"] {
        assert_eq!(report.results[&TaskId::from(id)], json!(id));
    }
}

#[tokio::test]
async fn test_chain_runs_in_dependency_order() {
    let mut harness = RunHarness::new();
    harness.add_task("extract", &[]).await;
    harness.add_task("transform", &["extract"]).await;
    harness.add_task("load", &["transform"]).await;

    let report = harness.run(&["extract"]).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    let events = harness.drain_events();
    assert_eq!(
        started_order(&events),
        ids(&["extract", "transform", "load"])
    );
}

#[tokio::test]
async fn test_diamond_join_waits_for_both_branches() {
    let mut harness = RunHarness::new();
    diamond(&harness).await;

    let report = harness.run(&["a"]).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.succeeded_count(), 4);

    // d must start after both b and c.
    let events = harness.drain_events();
    let order = started_order(&events);
    let pos = |name: &str| {
        order
            .iter()
            .position(|id| id == &TaskId::from(name))
            .unwrap()
    };
    assert!(pos("d") > pos("b"));
    assert!(pos("d") > pos("c"));
}

#[tokio::test]
async fn test_sibling_tasks_overlap() {
    let mut harness = RunHarness::new();
    {
        let mut registry = harness.registry.write().await;
        registry
            .register("a", slow_body(Duration::from_millis(80), json!(1)), vec![])
            .unwrap();
        registry
            .register("b", slow_body(Duration::from_millis(80), json!(2)), vec![])
            .unwrap();
        registry
            .register("c", slow_body(Duration::from_millis(80), json!(3)), vec![])
            .unwrap();
    }

    let started = std::time::Instant::now();
    let report = harness.run(&["a", "b", "c"]).await;
    let elapsed = started.elapsed();

    assert_eq!(report.outcome, RunOutcome::Completed);
    // Serial execution would take at least 240ms.
    assert!(
        elapsed < Duration::from_millis(200),
        "siblings should overlap, took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_start_set_subset_reaches_only_its_downstream() {
    let mut harness = RunHarness::new();
    harness.add_task("a", &[]).await;
    harness.add_task("b", &["a"]).await;
    harness.add_task("other", &[]).await;

    let report = harness.run(&["a"]).await;

    // "other" was registered but never reached.
    assert_eq!(report.outcome, RunOutcome::Deadlocked);
    assert_eq!(
        report.disposition(&TaskId::from("other")),
        Some(&TaskDisposition::NeverRan)
    );
    assert_eq!(
        report.disposition(&TaskId::from("b")),
        Some(&TaskDisposition::Succeeded)
    );
}

#[tokio::test]
async fn test_registry_statuses_match_report() {
    let mut harness = RunHarness::new();
    diamond(&harness).await;

    let report = harness.run(&["a"]).await;
    assert_eq!(report.outcome, RunOutcome::Completed);

    let registry = harness.registry.read().await;
    for id in ids(&["a", "b", "c", "d"]) {
        assert_eq!(registry.status(&id).unwrap(), TaskStatus::Success);
        let task = registry.task(&id).unwrap();
        assert!(task.started_at.is_some());
        assert!(task.finished_at.is_some());
    }
}

#[tokio::test]
async fn test_empty_start_set_quiesces_immediately() {
    let mut harness = RunHarness::new();
    harness.add_task("a", &[]).await;

    let report = harness.run(&[]).await;

    assert_eq!(report.outcome, RunOutcome::Deadlocked);
    assert_eq!(
        report.disposition(&TaskId::from("a")),
        Some(&TaskDisposition::NeverRan)
    );
}

#[tokio::test]
async fn test_empty_registry_completes() {
    let mut harness = RunHarness::new();
    let report = harness.run(&[]).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.dispositions.is_empty());
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let mut harness = RunHarness::new();
    harness.add_task("a", &[]).await;

    let report = harness.run(&["a"]).await;
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["outcome"], json!("completed"));
    assert_eq!(value["dispositions"]["a"]["disposition"], json!("succeeded"));
}

//! Human gate behavior: approval, denial, timeout, and cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use gantry::config::Config;
use gantry::core::{TaskId, TaskStatus};
use gantry::gate::{AutoGate, ChannelGate};
use gantry::orchestration::{RunOutcome, SchedulerEvent, TaskDisposition};

use crate::fixtures::RunHarness;

#[tokio::test]
async fn test_approved_gate_unblocks_dependents() {
    let mut harness = RunHarness::new();
    harness.add_task("analyze", &[]).await;
    harness.add_gated("action", &["analyze"]).await;
    harness.add_task("confirm", &["action"]).await;

    let report = harness.run(&["analyze"]).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.succeeded_count(), 3);
    // The gated task's body output survives the approval round trip.
    assert_eq!(report.results[&TaskId::from("action")], json!("action"));
}

#[tokio::test]
async fn test_denied_gate_fails_task_and_blocks_downstream() {
    let mut harness =
        RunHarness::with_gate(Arc::new(AutoGate::denying()), Config::default());
    harness.add_gated("action", &[]).await;
    harness.add_task("confirm", &["action"]).await;

    let report = harness.run(&["action"]).await;

    assert_eq!(report.outcome, RunOutcome::CompletedWithFailures);
    assert!(matches!(
        report.disposition(&TaskId::from("action")),
        Some(TaskDisposition::Failed { error }) if error == "approval denied"
    ));
    assert!(matches!(
        report.disposition(&TaskId::from("confirm")),
        Some(TaskDisposition::Unreachable { .. })
    ));
}

#[tokio::test]
async fn test_gate_sees_waiting_human_status() {
    let (gate, mut requests) = ChannelGate::new(4);
    let mut harness = RunHarness::with_gate(Arc::new(gate), Config::default());
    harness.add_gated("action", &[]).await;

    let registry = Arc::clone(&harness.registry);
    let responder = tokio::spawn(async move {
        let request = requests.recv().await.expect("approval request");
        // The task is parked while the decision is pending.
        let status = registry
            .read()
            .await
            .status(&request.task_id)
            .expect("task status");
        assert_eq!(status, TaskStatus::WaitingHuman);
        request.reply.send(true).expect("send decision");
    });

    let report = harness.run(&["action"]).await;
    responder.await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn test_channel_gate_denial() {
    let (gate, mut requests) = ChannelGate::new(4);
    let mut harness = RunHarness::with_gate(Arc::new(gate), Config::default());
    harness.add_gated("action", &[]).await;

    let responder = tokio::spawn(async move {
        let request = requests.recv().await.expect("approval request");
        request.reply.send(false).expect("send decision");
    });

    let report = harness.run(&["action"]).await;
    responder.await.unwrap();

    assert_eq!(report.outcome, RunOutcome::CompletedWithFailures);
}

#[tokio::test]
async fn test_dropped_gate_receiver_counts_as_denial() {
    let (gate, requests) = ChannelGate::new(4);
    drop(requests);
    let mut harness = RunHarness::with_gate(Arc::new(gate), Config::default());
    harness.add_gated("action", &[]).await;

    let report = harness.run(&["action"]).await;

    assert!(matches!(
        report.disposition(&TaskId::from("action")),
        Some(TaskDisposition::Failed { error }) if error == "approval denied"
    ));
}

#[tokio::test]
async fn test_gate_timeout_denies() {
    let config = Config {
        approval_timeout_secs: 0,
        ..Config::default()
    };
    let slow = AutoGate::approving().with_delay(Duration::from_millis(300));
    let mut harness = RunHarness::with_gate(Arc::new(slow), config);
    harness.add_gated("action", &[]).await;

    let report = harness.run(&["action"]).await;

    assert_eq!(report.outcome, RunOutcome::CompletedWithFailures);
    assert!(matches!(
        report.disposition(&TaskId::from("action")),
        Some(TaskDisposition::Failed { error }) if error == "approval denied"
    ));
}

#[tokio::test]
async fn test_auto_approve_skips_the_gate() {
    let config = Config {
        auto_approve: true,
        ..Config::default()
    };
    let mut harness = RunHarness::with_gate(Arc::new(AutoGate::denying()), config);
    harness.add_gated("action", &[]).await;

    let report = harness.run(&["action"]).await;
    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn test_multiple_gates_resolved_independently() {
    let (gate, mut requests) = ChannelGate::new(4);
    let mut harness = RunHarness::with_gate(Arc::new(gate), Config::default());
    harness.add_gated("first", &[]).await;
    harness.add_gated("second", &[]).await;

    let responder = tokio::spawn(async move {
        for _ in 0..2 {
            let request = requests.recv().await.expect("approval request");
            let approve = request.task_id == TaskId::from("first");
            request.reply.send(approve).expect("send decision");
        }
    });

    let report = harness.run(&["first", "second"]).await;
    responder.await.unwrap();

    assert_eq!(
        report.disposition(&TaskId::from("first")),
        Some(&TaskDisposition::Succeeded)
    );
    assert!(matches!(
        report.disposition(&TaskId::from("second")),
        Some(TaskDisposition::Failed { .. })
    ));
}

#[tokio::test]
async fn test_cancellation_during_gate_wait() {
    let slow = AutoGate::approving().with_delay(Duration::from_secs(30));
    let mut harness = RunHarness::with_gate(Arc::new(slow), Config::default());
    harness.add_task("analyze", &[]).await;
    harness.add_gated("action", &["analyze"]).await;

    let token = harness.scheduler.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let report = harness.run(&["analyze"]).await;

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    // The already-finished task keeps its success.
    assert_eq!(
        report.disposition(&TaskId::from("analyze")),
        Some(&TaskDisposition::Succeeded)
    );
    assert!(matches!(
        report.disposition(&TaskId::from("action")),
        Some(TaskDisposition::Failed { error }) if error == "run cancelled"
    ));
}

#[tokio::test]
async fn test_gate_events_emitted_in_order() {
    let mut harness = RunHarness::new();
    harness.add_gated("action", &[]).await;

    harness.run(&["action"]).await;
    let events = harness.drain_events();

    let requested = events
        .iter()
        .position(|e| matches!(e, SchedulerEvent::ApprovalRequested { .. }))
        .expect("ApprovalRequested emitted");
    let resolved = events
        .iter()
        .position(|e| {
            matches!(
                e,
                SchedulerEvent::ApprovalResolved { approved: true, .. }
            )
        })
        .expect("ApprovalResolved emitted");
    let completed = events
        .iter()
        .position(|e| matches!(e, SchedulerEvent::TaskCompleted { .. }))
        .expect("TaskCompleted emitted");
    assert!(requested < resolved);
    assert!(resolved < completed);
}

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::{mpsc, RwLock};

use gantry::config::Config;
use gantry::core::{body, Task, TaskId, TaskRegistry};
use gantry::gate::{ApprovalRequest, AutoGate, ChannelGate, HumanGate};
use gantry::orchestration::{RunOutcome, RunReport, Scheduler, SchedulerEvent};
use gantry::{glog, Result, TaskStatus};

/// Gantry - task-dependency workflow orchestrator with human approval gates
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    GANTRY_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Auto-approve human gates without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Enable debug logging (writes to ~/.gantry/gantry.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the built-in incident response workflow
    Run {
        /// Deny every human gate instead of prompting
        #[arg(long)]
        deny: bool,

        /// Override the approval timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Run without prompts or progress output, emit a JSON report
        #[arg(long)]
        headless: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    gantry::log::init_with_debug(cli.debug);

    match cli.command {
        Some(Command::Run {
            deny,
            timeout_secs,
            headless,
        }) => run_workflow(deny, timeout_secs, headless, cli.yes),
        None => {
            println!("gantry: no command given, try `gantry run` or `gantry --help`");
            Ok(())
        }
    }
}

/// Build and drive the demo incident response workflow.
fn run_workflow(deny: bool, timeout_secs: Option<u64>, headless: bool, yes: bool) -> Result<()> {
    let mut config = Config::load().unwrap_or_default();
    if let Some(secs) = timeout_secs {
        config.approval_timeout_secs = secs;
    }
    if yes {
        config.auto_approve = true;
    }

    glog!(
        "Run requested: deny={} headless={} auto_approve={}",
        deny,
        headless,
        config.auto_approve
    );

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let registry = Arc::new(RwLock::new(TaskRegistry::new()));
        register_incident_workflow(&mut *registry.write().await)?;

        let (event_tx, event_rx) = mpsc::channel(100);
        let gate = build_gate(deny, headless);
        let mut scheduler = Scheduler::new(Arc::clone(&registry), gate, config, event_tx);

        let progress = (!headless).then(|| tokio::spawn(print_progress(event_rx)));
        let report = scheduler.run(vec![TaskId::from("analyze")]).await;
        // Close the event channel so the progress task drains and exits.
        drop(scheduler);
        if let Some(handle) = progress {
            let _ = handle.await;
        }
        report
    })?;

    if headless {
        print_report_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(())
}

/// Register the demo workflow: analyze the incident, notify the
/// on-call channel, and take a remediation action behind a human gate.
fn register_incident_workflow(registry: &mut TaskRegistry) -> Result<()> {
    registry.register_task(
        Task::new("analyze", vec![]).with_description("classify the incident signal"),
        body(|| async {
            Ok(json!({
                "severity": "high",
                "service": "checkout",
                "signal": "error rate above threshold",
            }))
        }),
    )?;

    registry.register_task(
        Task::new("notify", vec![TaskId::from("analyze")])
            .with_description("page the on-call channel"),
        body(|| async {
            Ok(json!({
                "channel": "#oncall",
                "delivered": true,
            }))
        }),
    )?;

    registry.register_task(
        Task::new("action", vec![TaskId::from("analyze")])
            .with_description("restart the affected service")
            .with_approval(),
        body(|| async {
            Ok(json!({
                "action": "restart checkout service",
                "queued": true,
            }))
        }),
    )?;

    Ok(())
}

/// Choose the approval gate for this invocation.
///
/// `--deny` and headless mode use fixed gates; interactive runs get a
/// channel gate backed by a terminal prompt.
fn build_gate(deny: bool, headless: bool) -> Arc<dyn HumanGate> {
    if deny {
        return Arc::new(AutoGate::denying());
    }
    if headless {
        return Arc::new(AutoGate::approving());
    }
    let (gate, requests) = ChannelGate::new(16);
    tokio::spawn(prompt_for_approvals(requests));
    Arc::new(gate)
}

/// Answer approval requests from the terminal.
async fn prompt_for_approvals(mut requests: mpsc::Receiver<ApprovalRequest>) {
    while let Some(request) = requests.recv().await {
        let task_id = request.task_id.clone();
        let answer = tokio::task::spawn_blocking(move || {
            print!("Approve task '{}'? [y/N] ", task_id);
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return false;
            }
            matches!(line.trim(), "y" | "Y" | "yes")
        })
        .await
        .unwrap_or(false);
        let _ = request.reply.send(answer);
    }
}

/// Print task lifecycle events as they happen.
async fn print_progress(mut events: mpsc::Receiver<SchedulerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::TaskStarted { task_id } => {
                println!("  [{}] {}", format_status(&TaskStatus::Running), task_id);
            }
            SchedulerEvent::TaskCompleted { task_id } => {
                println!("  [{}] {}", format_status(&TaskStatus::Success), task_id);
            }
            SchedulerEvent::TaskFailed { task_id, error } => {
                println!("  [\x1b[31mfailed\x1b[0m] {}: {}", task_id, error);
            }
            SchedulerEvent::ApprovalRequested { task_id } => {
                println!(
                    "  [{}] {}",
                    format_status(&TaskStatus::WaitingHuman),
                    task_id
                );
            }
            SchedulerEvent::ApprovalResolved { .. } => {}
            SchedulerEvent::RunFinished { .. } => break,
        }
    }
}

/// Print the run report for interactive use.
fn print_report(report: &RunReport) {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║                     Workflow Finished                      ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();
    println!("  Run ID:      {}", report.run_id.short());
    println!("  Outcome:     {}", format_outcome(report.outcome));
    println!(
        "  Tasks:       {} succeeded, {} failed, {} unreachable",
        report.succeeded_count(),
        report.failed_count(),
        report.unreachable_count()
    );
    println!();
    for (task_id, disposition) in &report.dispositions {
        println!("  {:<12} {}", task_id.to_string(), disposition);
    }
    println!();
}

/// Print the run report as JSON for headless callers.
fn print_report_json(report: &RunReport) -> Result<()> {
    let output = json!({
        "run_id": report.run_id.to_string(),
        "outcome": report.outcome,
        "dispositions": report.dispositions,
        "results": report.results,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Format a run outcome with color codes for terminal.
fn format_outcome(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => format!("\x1b[32m{}\x1b[0m", outcome), // Green
        RunOutcome::CompletedWithFailures => format!("\x1b[33m{}\x1b[0m", outcome), // Yellow
        RunOutcome::Deadlocked => format!("\x1b[31m{}\x1b[0m", outcome), // Red
        RunOutcome::Cancelled => format!("\x1b[35m{}\x1b[0m", outcome), // Magenta
    }
}

/// Format a task status with color codes for terminal.
fn format_status(status: &TaskStatus) -> String {
    match status {
        TaskStatus::Pending => format!("\x1b[90m{}\x1b[0m", status), // Gray
        TaskStatus::Running => format!("\x1b[33m{}\x1b[0m", status), // Yellow
        TaskStatus::Success => format!("\x1b[32m{}\x1b[0m", status), // Green
        TaskStatus::Failed { .. } => format!("\x1b[31m{}\x1b[0m", status), // Red
        TaskStatus::WaitingHuman => format!("\x1b[34m{}\x1b[0m", status), // Blue
    }
}

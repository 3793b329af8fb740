//! Workflow orchestration: the scheduler loop and run reporting.

pub mod report;
pub mod scheduler;

pub use report::{RunId, RunOutcome, RunReport, TaskDisposition, UnreachableCause};
pub use scheduler::{Scheduler, SchedulerEvent};

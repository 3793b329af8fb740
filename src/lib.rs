pub mod config;
pub mod core;
pub mod error;
pub mod gate;
pub mod log;
pub mod orchestration;

pub use core::{body, Task, TaskBody, TaskId, TaskOutput, TaskRegistry, TaskStatus};
pub use error::{Error, Result};
pub use gate::{ApprovalRequest, AutoGate, ChannelGate, HumanGate};
pub use orchestration::{RunId, RunOutcome, RunReport, Scheduler, SchedulerEvent};

//! Core data model: task records and the registry that owns them.

pub mod registry;
pub mod task;

pub use registry::TaskRegistry;
pub use task::{body, BodyError, Task, TaskBody, TaskId, TaskOutput, TaskStatus};

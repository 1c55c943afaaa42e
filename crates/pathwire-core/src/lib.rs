#![forbid(unsafe_code)]

//! Core: cancellation tokens and the cooperative batching scheduler that
//! the path-observation engine delivers its notifications through.

pub mod cancel;
pub mod logging;
pub mod scheduler;

pub use cancel::{CancelController, CancelError, CancelToken};
pub use scheduler::{
    DrainError, DrainReport, Execution, Priority, Scheduler, SchedulerConfig, StepOutcome,
    TaskError, TaskFailure, TaskId, TaskResult,
};

//! Scheduler errors

use thiserror::Error;

use super::task::TaskId;

/// Scheduler result
pub type SchedResult<T> = Result<T, SchedError>;

/// Scheduler errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedError {
    #[error("task table is full ({capacity} slots, host included)")]
    CapacityExceeded { capacity: usize },

    #[error("{handle} does not name a created task ({num_tasks} created)")]
    InvalidHandle { handle: TaskId, num_tasks: usize },

    #[error("{handle} cannot wait on itself")]
    WaitOnSelf { handle: TaskId },

    #[error("a scheduler is already running on this thread")]
    AlreadyInitialized,

    #[error("failed to allocate a {size}-byte task stack: {reason}")]
    StackAllocation { size: usize, reason: String },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

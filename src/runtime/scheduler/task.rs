//! Task definitions for the scheduler.
//!
//! A [`TaskRecord`] is one slot of the task table. Slot `0` is the host: the
//! thread that built the scheduler. It is never created through
//! [`Scheduler::create`](super::Scheduler::create) and never exits through
//! the exit handler.

use context::Context;

use super::switch::TaskStacks;
use super::Scheduler;

/// Entry function of a task.
pub(crate) type TaskFn = Box<dyn FnOnce(&Scheduler)>;

/// Handle of a task.
///
/// Handles are slot indices. Slots are never recycled, so a handle keeps
/// naming the same task after it dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// The host task, registered by scheduler initialisation.
    pub const HOST: TaskId = TaskId(0);

    /// Get the slot index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }

    /// Whether this handle names the host task.
    #[inline]
    pub fn is_host(&self) -> bool {
        self.0 == 0
    }
}

impl From<TaskId> for usize {
    fn from(val: TaskId) -> Self {
        val.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// One slot of the task table.
pub(crate) struct TaskRecord {
    /// Name used in log events.
    pub(crate) name: String,
    /// True from creation until the exit handler runs.
    pub(crate) alive: bool,
    /// Clock reading before which the task must not run. `0` means not sleeping.
    pub(crate) wake_time: u64,
    /// Task this one is blocked on.
    pub(crate) waiting_for: Option<TaskId>,
    /// Saved execution state. `None` while the task is the one running.
    pub(crate) context: Option<Context>,
    /// Bootstrapped context that runs the exit handler.
    pub(crate) exit_context: Option<Context>,
    /// Both stacks of the task. Taken exactly once, after the task died.
    pub(crate) stacks: Option<TaskStacks>,
    /// Entry closure, taken by the task trampoline on first run.
    pub(crate) entry: Option<TaskFn>,
}

impl TaskRecord {
    /// The host record: alive, not waiting, no stacks of its own.
    pub(crate) fn host() -> Self {
        Self {
            name: "host".to_string(),
            alive: true,
            wake_time: 0,
            waiting_for: None,
            context: None,
            exit_context: None,
            stacks: None,
            entry: None,
        }
    }

    /// A freshly claimed worker record with no execution resources yet.
    pub(crate) fn worker(
        name: String,
        entry: TaskFn,
    ) -> Self {
        Self {
            name,
            alive: true,
            wake_time: 0,
            waiting_for: None,
            context: None,
            exit_context: None,
            stacks: None,
            entry: Some(entry),
        }
    }

    /// Whether the task still owns its stacks.
    #[inline]
    pub(crate) fn holds_stacks(&self) -> bool {
        self.stacks.is_some()
    }
}

impl std::fmt::Debug for TaskRecord {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("TaskRecord")
            .field("name", &self.name)
            .field("alive", &self.alive)
            .field("wake_time", &self.wake_time)
            .field("waiting_for", &self.waiting_for)
            .field("has_context", &self.context.is_some())
            .field("has_exit_context", &self.exit_context.is_some())
            .field("holds_stacks", &self.holds_stacks())
            .field("started", &self.entry.is_none())
            .finish()
    }
}

/// Read-only view of a task's scheduling metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// Task handle.
    pub id: TaskId,
    /// Task name.
    pub name: String,
    /// Whether the task has not exited yet.
    pub alive: bool,
    /// Wake-up time in clock milliseconds (`0` when never slept).
    pub wake_time: u64,
    /// Task this one is blocked on, if any.
    pub waiting_for: Option<TaskId>,
    /// Whether the task still owns its stacks.
    pub holds_stacks: bool,
}

impl TaskSnapshot {
    pub(crate) fn of(
        id: TaskId,
        record: &TaskRecord,
    ) -> Self {
        Self {
            id,
            name: record.name.clone(),
            alive: record.alive,
            wake_time: record.wake_time,
            waiting_for: record.waiting_for,
            holds_stacks: record.holds_stacks(),
        }
    }
}

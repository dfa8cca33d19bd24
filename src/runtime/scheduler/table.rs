//! Task table.
//!
//! Fixed-capacity arena of [`TaskRecord`]s plus the current/previous
//! indices. Slots are claimed in increasing order and never reused.
//!
//! Only [`TaskTable::select_next`] reassigns the current index.

use ::context::Context;

use super::error::{SchedError, SchedResult};
use super::readiness::is_ready;
use super::switch::{Bootstrapped, TaskStacks};
use super::task::{TaskFn, TaskId, TaskRecord, TaskSnapshot};

/// Result of a successful round-robin selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Selection {
    /// Task that was current before the selection.
    pub(crate) from: TaskId,
    /// Task that is current now.
    pub(crate) to: TaskId,
}

impl Selection {
    /// A selection of the already-current task needs no context switch.
    #[inline]
    pub(crate) fn is_switch(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug)]
pub(crate) struct TaskTable {
    records: Vec<TaskRecord>,
    capacity: usize,
    current: usize,
    /// Task that was current before the last switch. The side that gets
    /// resumed stores the suspended continuation into this slot.
    previous: usize,
    num_alive: usize,
}

impl TaskTable {
    /// Create a table holding only the host task.
    ///
    /// `capacity` is a bound, not a reservation: records grow as slots are
    /// claimed.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: vec![TaskRecord::host()],
            capacity,
            current: 0,
            previous: 0,
            num_alive: 1,
        }
    }

    /// Number of slots claimed so far, host included.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn num_alive(&self) -> usize {
        self.num_alive
    }

    #[inline]
    pub(crate) fn current(&self) -> TaskId {
        TaskId(self.current)
    }

    #[inline]
    pub(crate) fn previous(&self) -> TaskId {
        TaskId(self.previous)
    }

    #[inline]
    pub(crate) fn get(
        &self,
        id: TaskId,
    ) -> Option<&TaskRecord> {
        self.records.get(id.index())
    }

    /// Look up a created task, failing on handles past the last claimed slot.
    pub(crate) fn lookup(
        &self,
        id: TaskId,
    ) -> SchedResult<&TaskRecord> {
        self.get(id).ok_or(SchedError::InvalidHandle {
            handle: id,
            num_tasks: self.records.len(),
        })
    }

    #[inline]
    pub(crate) fn is_alive(
        &self,
        id: TaskId,
    ) -> bool {
        self.get(id).is_some_and(|record| record.alive)
    }

    pub(crate) fn snapshot(
        &self,
        id: TaskId,
    ) -> SchedResult<TaskSnapshot> {
        self.lookup(id).map(|record| TaskSnapshot::of(id, record))
    }

    /// Fail if no slot is left.
    pub(crate) fn ensure_capacity(&self) -> SchedResult<()> {
        if self.records.len() >= self.capacity {
            return Err(SchedError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Claim the next slot for a new, immediately ready task.
    pub(crate) fn claim(
        &mut self,
        name: Option<String>,
        entry: TaskFn,
    ) -> SchedResult<TaskId> {
        self.ensure_capacity()?;
        let id = TaskId(self.records.len());
        let name = name.unwrap_or_else(|| format!("task-{}", id.index()));
        self.records.push(TaskRecord::worker(name, entry));
        self.num_alive += 1;
        Ok(id)
    }

    /// Install the bootstrapped contexts and stacks of a claimed task.
    pub(crate) fn attach(
        &mut self,
        id: TaskId,
        boot: Bootstrapped,
    ) {
        let record = &mut self.records[id.index()];
        record.context = Some(boot.context);
        record.exit_context = Some(boot.exit_context);
        record.stacks = Some(boot.stacks);
    }

    /// First slot after the current one, in circular order, that is ready.
    /// The current task is the last candidate.
    pub(crate) fn peek_next(
        &self,
        now: u64,
    ) -> Option<TaskId> {
        let n = self.records.len();
        let start = self.current + 1;
        (0..n)
            .map(|step| (start + step) % n)
            .find(|&i| is_ready(&self.records[i], &self.records, now))
            .map(TaskId)
    }

    /// Select the next ready task and make it current.
    ///
    /// The chosen task's wait target is cleared: its condition, if any, has
    /// just been satisfied.
    pub(crate) fn select_next(
        &mut self,
        now: u64,
    ) -> Option<Selection> {
        let next = self.peek_next(now)?;
        self.records[next.index()].waiting_for = None;
        self.previous = self.current;
        self.current = next.index();
        Some(Selection {
            from: TaskId(self.previous),
            to: next,
        })
    }

    /// Block the current task on `target`.
    pub(crate) fn set_waiting(
        &mut self,
        target: TaskId,
    ) {
        self.records[self.current].waiting_for = Some(target);
    }

    /// Keep the current task from running before `wake_time`.
    pub(crate) fn set_wake_time(
        &mut self,
        wake_time: u64,
    ) {
        self.records[self.current].wake_time = wake_time;
    }

    pub(crate) fn take_context(
        &mut self,
        id: TaskId,
    ) -> Option<Context> {
        self.records[id.index()].context.take()
    }

    pub(crate) fn store_context(
        &mut self,
        id: TaskId,
        context: Context,
    ) {
        self.records[id.index()].context = Some(context);
    }

    pub(crate) fn take_entry(
        &mut self,
        id: TaskId,
    ) -> Option<TaskFn> {
        self.records[id.index()].entry.take()
    }

    pub(crate) fn take_exit_context(
        &mut self,
        id: TaskId,
    ) -> Option<Context> {
        self.records[id.index()].exit_context.take()
    }

    /// Mark the current task dead. Its stacks stay attached until execution
    /// has left them; see [`TaskTable::release_stacks`].
    pub(crate) fn mark_exited(&mut self) -> TaskId {
        debug_assert_ne!(self.current, 0, "the host task never exits");
        let record = &mut self.records[self.current];
        record.alive = false;
        record.waiting_for = None;
        self.num_alive -= 1;
        TaskId(self.current)
    }

    /// Detach the stacks of a dead task. Returns `None` if they were already
    /// released or the task never had any.
    pub(crate) fn release_stacks(
        &mut self,
        id: TaskId,
    ) -> Option<TaskStacks> {
        let record = &mut self.records[id.index()];
        debug_assert!(!record.alive, "stacks of a live task are never released");
        record.context = None;
        record.exit_context = None;
        record.stacks.take()
    }

    /// True when every live task waits on another live task. Nothing can
    /// change that, so no task will ever become ready again.
    pub(crate) fn is_deadlocked(&self) -> bool {
        self.records
            .iter()
            .filter(|record| record.alive)
            .all(|record| {
                record
                    .waiting_for
                    .is_some_and(|target| self.is_alive(target))
            })
    }

    #[cfg(test)]
    pub(crate) fn force_current(
        &mut self,
        id: TaskId,
    ) {
        self.previous = self.current;
        self.current = id.index();
    }
}

//! Readiness evaluation.

use super::task::TaskRecord;

/// Whether `task` may run at clock reading `now`.
///
/// A task is ready when it is alive, the task it waits on (if any) is no
/// longer alive, and its wake time has passed. A wait target outside
/// `records` counts as not alive. No side effects.
#[inline]
pub(crate) fn is_ready(
    task: &TaskRecord,
    records: &[TaskRecord],
    now: u64,
) -> bool {
    task.alive && wait_satisfied(task, records) && task.wake_time <= now
}

#[inline]
fn wait_satisfied(
    task: &TaskRecord,
    records: &[TaskRecord],
) -> bool {
    match task.waiting_for {
        None => true,
        Some(target) => !records
            .get(target.index())
            .is_some_and(|record| record.alive),
    }
}

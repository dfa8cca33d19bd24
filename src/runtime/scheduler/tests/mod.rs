//! Scheduler unit tests
//!
//! Task table bookkeeping, readiness and round-robin selection, without
//! switching any contexts.


use crate::runtime::scheduler::table::TaskTable;
use crate::runtime::scheduler::task::{TaskId, TaskRecord};

/// A table with the host plus `workers` claimed (never started) tasks.
fn table_with(workers: usize) -> TaskTable {
    let mut table = TaskTable::new(workers + 1);
    for _ in 0..workers {
        table.claim(None, Box::new(|_| {})).unwrap();
    }
    table
}

/// Run `id` as current and let it exit.
fn exit_task(
    table: &mut TaskTable,
    id: TaskId,
) {
    let current = table.current();
    table.force_current(id);
    table.mark_exited();
    table.force_current(current);
}

fn worker(name: &str) -> TaskRecord {
    TaskRecord::worker(name.to_string(), Box::new(|_| {}))
}

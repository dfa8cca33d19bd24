//! Error reporting of the lifecycle API.

use std::cell::RefCell;
use std::rc::Rc;

use cosched::{SchedError, Scheduler, SchedulerConfig, TaskId};

fn small(max_tasks: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_tasks,
        ..SchedulerConfig::default()
    }
}

#[test]
fn test_capacity_exceeded() {
    let scheduler = Scheduler::with_config(small(3)).unwrap();
    let first = scheduler.create(|_| {}).unwrap();
    let second = scheduler.create(|_| {}).unwrap();

    let err = scheduler.create(|_| {}).unwrap_err();
    assert_eq!(err, SchedError::CapacityExceeded { capacity: 3 });
    assert_eq!(scheduler.num_tasks(), 3);

    // Slots of dead tasks are not reused.
    scheduler.wait(first).unwrap();
    scheduler.wait(second).unwrap();
    assert!(matches!(
        scheduler.create(|_| {}),
        Err(SchedError::CapacityExceeded { .. })
    ));
}

#[test]
fn test_host_only_table_is_full() {
    let scheduler = Scheduler::with_config(small(1)).unwrap();
    assert_eq!(
        scheduler.create(|_| {}),
        Err(SchedError::CapacityExceeded { capacity: 1 })
    );
    assert_eq!(scheduler.stats().tasks_created(), 0);
}

#[test]
fn test_invalid_handle() {
    let stale = {
        let scheduler = Scheduler::new().unwrap();
        let a = scheduler.create(|_| {}).unwrap();
        let b = scheduler.create(|_| {}).unwrap();
        scheduler.wait(a).unwrap();
        scheduler.wait(b).unwrap();
        b
    };

    let scheduler = Scheduler::new().unwrap();
    let expected = SchedError::InvalidHandle {
        handle: stale,
        num_tasks: 1,
    };
    assert_eq!(scheduler.wait(stale), Err(expected.clone()));
    assert_eq!(scheduler.is_alive(stale), Err(expected.clone()));
    assert_eq!(scheduler.snapshot(stale), Err(expected));
    assert_eq!(scheduler.stats().context_switches(), 0);
}

#[test]
fn test_wait_on_self() {
    let scheduler = Scheduler::new().unwrap();
    assert_eq!(
        scheduler.wait(TaskId::HOST),
        Err(SchedError::WaitOnSelf {
            handle: TaskId::HOST
        })
    );

    let seen = Rc::new(RefCell::new(None));
    let task = {
        let seen = seen.clone();
        scheduler
            .create(move |sched| {
                *seen.borrow_mut() = Some(sched.wait(sched.current()));
            })
            .unwrap()
    };
    scheduler.wait(task).unwrap();

    assert_eq!(
        seen.borrow_mut().take(),
        Some(Err(SchedError::WaitOnSelf { handle: task }))
    );
    assert_eq!(scheduler.snapshot(task).unwrap().waiting_for, None);
}

#[test]
fn test_one_scheduler_per_thread() {
    let first = Scheduler::new().unwrap();
    assert_eq!(Scheduler::new().unwrap_err(), SchedError::AlreadyInitialized);

    // Clones share the one scheduler; it stays registered until the last
    // handle goes.
    let clone = first.clone();
    drop(first);
    assert_eq!(Scheduler::new().unwrap_err(), SchedError::AlreadyInitialized);
    drop(clone);

    assert!(Scheduler::new().is_ok());
}

#[test]
fn test_scheduler_per_thread_is_independent() {
    let _here = Scheduler::new().unwrap();
    let there = std::thread::spawn(|| {
        let scheduler = Scheduler::new().unwrap();
        let task = scheduler.create(|_| {}).unwrap();
        scheduler.wait(task).unwrap();
        scheduler.num_alive()
    });
    assert_eq!(there.join().unwrap(), 1);
}

#[test]
fn test_invalid_config() {
    let err = Scheduler::with_config(small(0)).unwrap_err();
    assert!(matches!(err, SchedError::InvalidConfig(_)));

    let err = Scheduler::with_config(SchedulerConfig {
        stack_size: 0,
        ..SchedulerConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, SchedError::InvalidConfig(_)));
    assert!(err.to_string().contains("stack_size"));

    // A rejected configuration does not claim the thread.
    assert!(Scheduler::new().is_ok());
}

#[test]
fn test_huge_max_tasks_is_a_bound_not_an_allocation() {
    let scheduler = Scheduler::with_config(small(usize::MAX)).unwrap();
    assert_eq!(scheduler.capacity(), usize::MAX);
    assert_eq!(scheduler.num_tasks(), 1);

    let task = scheduler.create(|_| {}).unwrap();
    scheduler.wait(task).unwrap();
    assert_eq!(scheduler.num_tasks(), 2);
    assert!(!scheduler.is_alive(task).unwrap());
}

#[test]
fn test_stack_allocation_failure_claims_no_slot() {
    let scheduler = Scheduler::with_config(SchedulerConfig {
        stack_size: 1 << 52,
        ..SchedulerConfig::default()
    })
    .unwrap();

    let err = scheduler.create(|_| {}).unwrap_err();
    assert!(
        matches!(err, SchedError::StackAllocation { size, .. } if size == 1 << 52),
        "unexpected error: {err}"
    );
    assert_eq!(scheduler.num_tasks(), 1);
    assert_eq!(scheduler.num_alive(), 1);
    assert_eq!(scheduler.stats().tasks_created(), 0);
}

#[test]
fn test_error_messages() {
    assert_eq!(
        SchedError::CapacityExceeded { capacity: 4 }.to_string(),
        "task table is full (4 slots, host included)"
    );
    assert_eq!(
        SchedError::WaitOnSelf {
            handle: TaskId::HOST
        }
        .to_string(),
        "Task(0) cannot wait on itself"
    );
    assert_eq!(
        SchedError::AlreadyInitialized.to_string(),
        "a scheduler is already running on this thread"
    );
}

//! A sleeper, a reader that waits on it, and the host waiting on the reader.

use std::cell::Cell;
use std::rc::Rc;

use cosched::{Scheduler, ScriptedInput, TaskId};

use crate::Trace;

#[test]
fn test_sleeper_reader_host() {
    let scheduler = Scheduler::builder()
        .input(ScriptedInput::from_script(".a..b.c", '.'))
        .build()
        .unwrap();
    let trace = Trace::default();
    let slept = Rc::new(Cell::new(0u64));

    let a = {
        let trace = trace.clone();
        let slept = slept.clone();
        scheduler
            .create_named("A", move |sched| {
                trace.push("A sleeps");
                let start = sched.now_ms();
                sched.sleep(50);
                slept.set(sched.now_ms() - start);
                trace.push("A done");
            })
            .unwrap()
    };
    let b = {
        let trace = trace.clone();
        scheduler
            .create_named("B", move |sched| {
                for _ in 0..3 {
                    let c = sched.read_char();
                    trace.push(format!("B read {c}"));
                }
                trace.push("B waits");
                sched.wait(a).unwrap();
                trace.push("B done");
            })
            .unwrap()
    };
    assert_eq!(scheduler.num_tasks(), 3);
    assert!(trace.events().is_empty());

    trace.push("host waits");
    scheduler.wait(b).unwrap();
    trace.push("host resumes");

    assert_eq!(
        trace.events(),
        vec![
            "host waits",
            "A sleeps",
            "B read a",
            "B read b",
            "B read c",
            "B waits",
            "A done",
            "B done",
            "host resumes",
        ]
    );
    assert!(slept.get() >= 50, "A slept {} ms", slept.get());
    assert_eq!(scheduler.current(), TaskId::HOST);
    assert!(!scheduler.is_alive(a).unwrap());
    assert!(!scheduler.is_alive(b).unwrap());
    assert_eq!(scheduler.num_alive(), 1);
    assert_eq!(scheduler.stats().stacks_released(), 2);
}

#[test]
fn test_wait_on_dead_handle_takes_one_turn() {
    let scheduler = Scheduler::new().unwrap();
    let trace = Trace::default();

    let short = {
        let trace = trace.clone();
        scheduler.create(move |_| trace.push("short")).unwrap()
    };
    let waiter = {
        let trace = trace.clone();
        scheduler
            .create(move |sched| {
                sched.sleep(0);
                // `short` is dead by now.
                let switches = sched.stats().context_switches();
                sched.wait(short).unwrap();
                trace.push(format!(
                    "waiter back after {} switches",
                    sched.stats().context_switches() - switches
                ));
            })
            .unwrap()
    };
    scheduler.wait(waiter).unwrap();

    assert_eq!(
        trace.events(),
        vec!["short", "waiter back after 0 switches"]
    );
}

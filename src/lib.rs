//! cosched - cooperative task scheduling on one thread
//!
//! Multiplexes many logical tasks onto the calling thread by saving and
//! restoring execution contexts. There is no preemption: a task keeps the
//! thread until it waits on another task, sleeps, blocks on input, or
//! returns.
//!
//! # Example
//!
//! ```no_run
//! use cosched::{Scheduler, SchedResult};
//!
//! fn main() -> SchedResult<()> {
//!     let scheduler = Scheduler::new()?;
//!
//!     let sleeper = scheduler.create(|sched| {
//!         sched.sleep(50);
//!     })?;
//!     let reader = scheduler.create(move |sched| {
//!         let c = sched.read_char();
//!         println!("read {c:?}");
//!         sched.wait(sleeper).unwrap();
//!     })?;
//!
//!     scheduler.wait(reader)?;
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod util;

pub use runtime::clock::{Clock, MonotonicClock};
pub use runtime::input::{ChannelInput, InputSource, NoInput, ScriptedInput};
pub use runtime::scheduler::{
    min_stack_size, IdleStrategy, SchedError, SchedResult, Scheduler, SchedulerBuilder,
    SchedulerConfig, SchedulerStats, TaskId, TaskSnapshot,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "cosched";

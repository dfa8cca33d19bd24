//! Cooperative task scheduler.
//!
//! Multiplexes many tasks onto the calling thread by explicitly switching
//! execution contexts. Nothing is preempted: a task gives up the thread only
//! inside [`Scheduler::wait`], [`Scheduler::sleep`], [`Scheduler::read_char`],
//! or when its entry function returns.
//!
//! # Architecture
//!
//! - [`TaskId`](task::TaskId) - handle of a task (a slot index, never reused)
//! - `TaskTable` - fixed-capacity arena of task records
//! - `readiness` - the pure "may this task run now" predicate
//! - `switch` - stacks, bootstrap and the context switch itself
//! - [`Scheduler`] - round-robin loop and the task lifecycle API
//!
//! The thread that builds the [`Scheduler`] becomes task 0, the host.
//!
//! # Livelock
//!
//! When no task is ready the loop keeps polling the clock until one is.
//! If every live task waits on another live task nothing will ever become
//! ready; this is logged once per stall and is the task author's bug.

mod error;
mod readiness;
mod switch;
mod table;
pub mod task;

pub use error::{SchedError, SchedResult};
pub use switch::min_stack_size;
pub use task::{TaskId, TaskSnapshot};

use std::cell::{Cell, RefCell};
use std::mem::ManuallyDrop;
use std::rc::Rc;
use std::time::Duration;

use ::context::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::runtime::clock::{Clock, MonotonicClock};
use crate::runtime::input::{InputSource, NoInput};
use table::TaskTable;
use task::TaskFn;

thread_local! {
    /// Whether a scheduler core is alive on this thread.
    static ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// What the loop does after a full scan found no ready task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleStrategy {
    /// Busy-poll with a spin-loop hint.
    #[default]
    Spin,
    /// Offer the rest of the OS time slice to other threads.
    Yield,
}

impl IdleStrategy {
    #[inline]
    fn idle(self) {
        match self {
            IdleStrategy::Spin => std::hint::spin_loop(),
            IdleStrategy::Yield => std::thread::yield_now(),
        }
    }
}

impl std::str::FromStr for IdleStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spin" => Ok(IdleStrategy::Spin),
            "yield" => Ok(IdleStrategy::Yield),
            other => Err(format!("unknown idle strategy `{}`", other)),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Task table size, host included. Slots are never reused, so this
    /// bounds the number of tasks created over the scheduler's life.
    pub max_tasks: usize,
    /// Size of each of the two stacks of a task, in bytes.
    pub stack_size: usize,
    /// Behaviour while no task is ready.
    pub idle: IdleStrategy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks: 128,
            stack_size: 64 * 1024,
            idle: IdleStrategy::Spin,
        }
    }
}

impl SchedulerConfig {
    /// Check the configuration against the context primitive's limits.
    pub fn validate(&self) -> SchedResult<()> {
        if self.max_tasks == 0 {
            return Err(SchedError::InvalidConfig(
                "max_tasks must leave room for the host task".to_string(),
            ));
        }
        let min = min_stack_size();
        if self.stack_size < min {
            return Err(SchedError::InvalidConfig(format!(
                "stack_size {} is below the minimum of {} bytes",
                self.stack_size, min
            )));
        }
        Ok(())
    }
}

/// Scheduler statistics.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    tasks_created: Cell<u64>,
    tasks_exited: Cell<u64>,
    context_switches: Cell<u64>,
    idle_passes: Cell<u64>,
    stacks_released: Cell<u64>,
}

impl SchedulerStats {
    #[inline]
    fn bump(counter: &Cell<u64>) {
        counter.set(counter.get() + 1);
    }

    /// Tasks created, host excluded.
    #[inline]
    pub fn tasks_created(&self) -> u64 {
        self.tasks_created.get()
    }

    /// Tasks whose entry function returned.
    #[inline]
    pub fn tasks_exited(&self) -> u64 {
        self.tasks_exited.get()
    }

    /// Switches between two different tasks.
    #[inline]
    pub fn context_switches(&self) -> u64 {
        self.context_switches.get()
    }

    /// Full scans that found no ready task.
    #[inline]
    pub fn idle_passes(&self) -> u64 {
        self.idle_passes.get()
    }

    /// Dead tasks whose stack pair has been freed.
    #[inline]
    pub fn stacks_released(&self) -> u64 {
        self.stacks_released.get()
    }
}

/// State shared by every handle of one scheduler.
pub(crate) struct Core {
    table: RefCell<TaskTable>,
    clock: Box<dyn Clock>,
    input: RefCell<Box<dyn InputSource>>,
    config: SchedulerConfig,
    stats: SchedulerStats,
}

impl Core {
    /// Transfer data passed along every resume.
    #[inline]
    fn resume_data(&self) -> usize {
        self as *const Core as usize
    }

    /// # Safety
    ///
    /// `data` must come from [`Core::resume_data`] of a core that is still
    /// alive.
    #[inline]
    unsafe fn from_resume_data<'a>(data: usize) -> &'a Core {
        &*(data as *const Core)
    }

    /// Run the round-robin loop until some task is selected, then switch to
    /// it. Returns when the calling task is selected again.
    fn schedule_next(&self) {
        let mut stalled = false;
        loop {
            let now = self.clock.now_ms();
            let selection = self.table.borrow_mut().select_next(now);
            match selection {
                Some(selection) if !selection.is_switch() => return,
                Some(selection) => {
                    let target = self.table.borrow_mut().take_context(selection.to);
                    let Some(target) = target else {
                        panic!("{} was selected without a saved context", selection.to);
                    };
                    SchedulerStats::bump(&self.stats.context_switches);
                    trace!(from = %selection.from, to = %selection.to, "context switch");
                    switch::switch_to(self, target);
                    return;
                }
                None => {
                    SchedulerStats::bump(&self.stats.idle_passes);
                    if !stalled {
                        stalled = true;
                        trace!(now, "no task ready");
                        if self.table.borrow().is_deadlocked() {
                            warn!("every live task waits on another live task; nothing can run");
                        }
                    }
                    self.config.idle.idle();
                }
            }
        }
    }

    /// Called first thing on the side that was just resumed, with the
    /// continuation of the task that switched away.
    fn land(
        &self,
        suspended: Context,
    ) {
        let mut table = self.table.borrow_mut();
        let from = table.previous();
        if table.is_alive(from) {
            table.store_context(from, suspended);
            return;
        }
        let released = table.release_stacks(from);
        drop(table);
        if let Some(stacks) = released {
            drop(stacks);
            SchedulerStats::bump(&self.stats.stacks_released);
            debug!(task = %from, "task stacks released");
        }
    }

    fn take_entry(
        &self,
        id: TaskId,
    ) -> Option<TaskFn> {
        self.table.borrow_mut().take_entry(id)
    }

    fn take_exit_context(
        &self,
        id: TaskId,
    ) -> Option<Context> {
        self.table.borrow_mut().take_exit_context(id)
    }

    /// Exit handler: runs on the exit stack of the current task once its
    /// entry function has returned.
    fn exit_current(&self) -> ! {
        let id = self.table.borrow_mut().mark_exited();
        SchedulerStats::bump(&self.stats.tasks_exited);
        debug!(task = %id, "task exited");
        self.schedule_next();
        unreachable!("{id} was scheduled after exiting");
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        let table = self.table.get_mut();
        if table.num_alive() > 1 {
            warn!(
                alive = table.num_alive() - 1,
                "scheduler dropped with unfinished tasks; their stacks are freed without unwinding"
            );
        }
        ACTIVE.with(|active| active.set(false));
    }
}

/// Builder for a [`Scheduler`] with custom collaborators.
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Box<dyn Clock>>,
    input: Option<Box<dyn InputSource>>,
}

impl SchedulerBuilder {
    /// Create a new builder with the default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    #[inline]
    pub fn config(
        mut self,
        config: SchedulerConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Set the millisecond clock. Defaults to [`MonotonicClock`].
    #[inline]
    pub fn clock(
        mut self,
        clock: impl Clock + 'static,
    ) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Set the character input. Defaults to [`NoInput`].
    #[inline]
    pub fn input(
        mut self,
        input: impl InputSource + 'static,
    ) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    /// Initialise the scheduler and register the calling thread as the host
    /// task.
    pub fn build(self) -> SchedResult<Scheduler> {
        self.config.validate()?;
        if ACTIVE.with(|active| active.replace(true)) {
            return Err(SchedError::AlreadyInitialized);
        }

        let core = Core {
            table: RefCell::new(TaskTable::new(self.config.max_tasks)),
            clock: self
                .clock
                .unwrap_or_else(|| Box::new(MonotonicClock::new())),
            input: RefCell::new(self.input.unwrap_or_else(|| Box::new(NoInput))),
            config: self.config,
            stats: SchedulerStats::default(),
        };
        debug!(
            max_tasks = core.config.max_tasks,
            stack_size = core.config.stack_size,
            "scheduler initialised"
        );

        Ok(Scheduler {
            core: Rc::new(core),
        })
    }
}

/// Handle to a cooperative scheduler.
///
/// Handles are cheap to clone and all refer to the same task table. Every
/// task entry function receives one. The scheduler lives until the last
/// handle is dropped; dropping it while tasks are unfinished frees their
/// stacks without unwinding them.
///
/// # Example
///
/// ```no_run
/// use cosched::Scheduler;
///
/// let scheduler = Scheduler::new()?;
/// let worker = scheduler.create(|sched| {
///     sched.sleep(10);
/// })?;
/// scheduler.wait(worker)?;
/// # Ok::<(), cosched::SchedError>(())
/// ```
#[derive(Clone)]
pub struct Scheduler {
    core: Rc<Core>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let table = self.core.table.borrow();
        f.debug_struct("Scheduler")
            .field("current", &table.current())
            .field("num_tasks", &table.len())
            .field("num_alive", &table.num_alive())
            .field("config", &self.core.config)
            .finish()
    }
}

impl Scheduler {
    /// Initialise a scheduler with the default configuration, clock and
    /// input.
    #[inline]
    pub fn new() -> SchedResult<Self> {
        SchedulerBuilder::new().build()
    }

    /// Initialise a scheduler with a custom configuration.
    #[inline]
    pub fn with_config(config: SchedulerConfig) -> SchedResult<Self> {
        SchedulerBuilder::new().config(config).build()
    }

    /// Start building a scheduler.
    #[inline]
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Rebuild a handle inside a task trampoline without taking ownership.
    ///
    /// # Safety
    ///
    /// `data` must come from [`Core::resume_data`] of a core owned by an
    /// `Rc` that outlives the returned handle.
    #[inline]
    pub(crate) unsafe fn borrow_resume_data(data: usize) -> ManuallyDrop<Scheduler> {
        ManuallyDrop::new(Scheduler {
            core: Rc::from_raw(data as *const Core),
        })
    }

    /// Create a task that will run `entry` once it is first scheduled.
    ///
    /// The task is ready immediately but does not run until the calling task
    /// yields. When `entry` returns, the task exits and its stacks are freed.
    pub fn create<F>(
        &self,
        entry: F,
    ) -> SchedResult<TaskId>
    where
        F: FnOnce(&Scheduler) + 'static,
    {
        self.spawn_task(None, Box::new(entry))
    }

    /// Like [`Scheduler::create`], with a name for log events.
    pub fn create_named<F>(
        &self,
        name: impl Into<String>,
        entry: F,
    ) -> SchedResult<TaskId>
    where
        F: FnOnce(&Scheduler) + 'static,
    {
        self.spawn_task(Some(name.into()), Box::new(entry))
    }

    fn spawn_task(
        &self,
        name: Option<String>,
        entry: TaskFn,
    ) -> SchedResult<TaskId> {
        self.core.table.borrow().ensure_capacity()?;
        let boot = switch::bootstrap(self.core.config.stack_size)?;

        let mut table = self.core.table.borrow_mut();
        let id = table.claim(name, entry)?;
        table.attach(id, boot);
        drop(table);

        SchedulerStats::bump(&self.core.stats.tasks_created);
        debug!(task = %id, "task created");
        Ok(id)
    }

    /// Block the calling task until `target` has exited.
    ///
    /// Waiting on a task that already exited still passes through the
    /// scheduler once and then returns.
    pub fn wait(
        &self,
        target: TaskId,
    ) -> SchedResult<()> {
        {
            let mut table = self.core.table.borrow_mut();
            table.lookup(target)?;
            if target == table.current() {
                return Err(SchedError::WaitOnSelf { handle: target });
            }
            table.set_waiting(target);
        }
        self.core.schedule_next();
        Ok(())
    }

    /// Block the calling task for at least `ms` milliseconds.
    ///
    /// `sleep(0)` still gives every other ready task a turn first.
    pub fn sleep(
        &self,
        ms: u64,
    ) {
        let wake_time = self.core.clock.now_ms().saturating_add(ms);
        self.core.table.borrow_mut().set_wake_time(wake_time);
        self.core.schedule_next();
    }

    /// [`Scheduler::sleep`] taking a [`Duration`], rounded up to whole
    /// milliseconds.
    pub fn sleep_for(
        &self,
        duration: Duration,
    ) {
        let mut ms = duration.as_millis();
        if duration.subsec_nanos() % 1_000_000 != 0 {
            ms += 1;
        }
        self.sleep(u64::try_from(ms).unwrap_or(u64::MAX));
    }

    /// Read one character, yielding to other tasks until one is available.
    pub fn read_char(&self) -> char {
        loop {
            let polled = self.core.input.borrow_mut().poll_char();
            match polled {
                Some(c) => return c,
                None => self.core.schedule_next(),
            }
        }
    }

    /// The task that is running.
    #[inline]
    pub fn current(&self) -> TaskId {
        self.core.table.borrow().current()
    }

    /// Whether `id` has not exited yet.
    pub fn is_alive(
        &self,
        id: TaskId,
    ) -> SchedResult<bool> {
        self.core.table.borrow().lookup(id).map(|record| record.alive)
    }

    /// Scheduling metadata of `id`.
    pub fn snapshot(
        &self,
        id: TaskId,
    ) -> SchedResult<TaskSnapshot> {
        self.core.table.borrow().snapshot(id)
    }

    /// Tasks created so far, host included.
    #[inline]
    pub fn num_tasks(&self) -> usize {
        self.core.table.borrow().len()
    }

    /// Tasks that have not exited, host included.
    #[inline]
    pub fn num_alive(&self) -> usize {
        self.core.table.borrow().num_alive()
    }

    /// Size of the task table.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.core.table.borrow().capacity()
    }

    /// Current reading of the scheduler's clock.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.core.clock.now_ms()
    }

    /// Get statistics.
    #[inline]
    pub fn stats(&self) -> &SchedulerStats {
        &self.core.stats
    }

    /// Get the configuration.
    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }
}

#[cfg(test)]
mod tests;

//! Context switching.
//!
//! Binds the scheduler to the `context` crate. A created task gets two
//! guard-page protected stacks and two bootstrapped contexts:
//!
//! - the task context starts in [`task_trampoline`], which runs the entry
//!   closure and, once it returns, resumes the exit context;
//! - the exit context starts in [`exit_trampoline`], which runs the exit
//!   handler on its own stack and never returns.
//!
//! Every resume passes the address of the scheduler core as transfer data.
//! The resumed side receives the suspended continuation and hands it to
//! [`Core::land`], which either saves it into the previous task's record or,
//! when the previous task is dead, releases that task's stacks. Stacks are
//! therefore only freed once execution has left them.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use ::context::stack::{ProtectedFixedSizeStack, Stack};
use ::context::{Context, Transfer};
use tracing::error;

use super::error::{SchedError, SchedResult};
use super::{Core, Scheduler};

/// The two stacks owned by a created task.
pub(crate) struct TaskStacks {
    _main: ProtectedFixedSizeStack,
    _exit: ProtectedFixedSizeStack,
}

/// Execution resources of a task that has not run yet.
pub(crate) struct Bootstrapped {
    pub(crate) context: Context,
    pub(crate) exit_context: Context,
    pub(crate) stacks: TaskStacks,
}

/// Smallest stack size the context primitive accepts.
pub fn min_stack_size() -> usize {
    Stack::min_size()
}

fn allocate_stack(size: usize) -> SchedResult<ProtectedFixedSizeStack> {
    ProtectedFixedSizeStack::new(size).map_err(|e| SchedError::StackAllocation {
        size,
        reason: format!("{:?}", e),
    })
}

/// Allocate both stacks and bootstrap both contexts of a new task.
pub(crate) fn bootstrap(stack_size: usize) -> SchedResult<Bootstrapped> {
    let exit = allocate_stack(stack_size)?;
    let main = allocate_stack(stack_size)?;

    // SAFETY: the stacks move into the task record together with the
    // contexts and are only dropped after the task is dead and execution
    // has switched away from them.
    let (context, exit_context) = unsafe {
        (
            Context::new(&main, task_trampoline),
            Context::new(&exit, exit_trampoline),
        )
    };

    Ok(Bootstrapped {
        context,
        exit_context,
        stacks: TaskStacks {
            _main: main,
            _exit: exit,
        },
    })
}

/// Suspend the running task and resume `target`.
///
/// Returns once some later switch resumes the suspended task.
pub(crate) fn switch_to(
    core: &Core,
    target: Context,
) {
    // SAFETY: `target` was either bootstrapped on a stack owned by its task
    // record or captured by a previous switch away from a live task.
    let transfer = unsafe { target.resume(core.resume_data()) };
    core.land(transfer.context);
}

extern "C" fn task_trampoline(transfer: Transfer) -> ! {
    // SAFETY: transfer data is always the address of a core kept alive by
    // the host's handle for as long as any task can run.
    let scheduler = unsafe { Scheduler::borrow_resume_data(transfer.data) };
    scheduler.core.land(transfer.context);

    let id = scheduler.current();
    if let Some(entry) = scheduler.core.take_entry(id) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| entry(&*scheduler))) {
            error!(task = %id, "task panicked: {}", panic_message(payload.as_ref()));
        }
    }

    let exit = scheduler.core.take_exit_context(id);
    let data = scheduler.core.resume_data();

    let Some(exit) = exit else {
        unreachable!("{id} returned without an exit context");
    };
    // SAFETY: the exit context was bootstrapped with this task and is
    // resumed at most once, from here.
    unsafe {
        exit.resume(data);
    }
    unreachable!("{id} was resumed after exiting");
}

extern "C" fn exit_trampoline(transfer: Transfer) -> ! {
    // SAFETY: see `task_trampoline`.
    let core = unsafe { Core::from_resume_data(transfer.data) };
    // The finished task body is never resumed again.
    let _finished = transfer.context;
    core.exit_current()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

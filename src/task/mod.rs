//! Task graph engine.
//!
//! A task is a function-pointer body plus a window of machine-word
//! arguments and a place in a dependency DAG. Classic table-driven
//! design: no boxed closures, no `dyn` — a body is a plain `fn` that
//! receives the runtime handle and returns a [`TaskExit`] describing
//! what the dispatcher should do next.
//!
//! ```text
//!   dispatch(t, a0, a1, a2)
//!        │
//!        ▼            body returns TaskExit
//!   ┌─────────┐   Success ──▶ fire Default edges, complete, post waiter
//!   │  READY  │──▶ Again ────▶ re-enqueue at the tail
//!   │  queue  │   Continue ─▶ fire Continue edges, re-arm, no post
//!   └─────────┘   Finish ───▶ fire Finish edges, complete, post waiter
//!                 Error ────▶ fire Error edges, abort the chain
//! ```
//!
//! Edges carry a dependency flavor (Hard outlives episodes, Soft is
//! severed when the parent terminates) and a trigger (which exit action
//! fires them). The parent counter that gates dispatch tracks hard
//! Default in-edges only; other triggers are events that release an
//! otherwise-unblocked child when they fire.

pub mod scheduler;

use crate::sys::Word;

/// Argument words carried by a task: three public, two internal.
///
/// The public window is what `dispatch`/`emit` set. The internal words
/// tag compound flows with their op-code and pool slot and survive
/// re-dispatch untouched.
pub const TASK_ARGS: usize = 5;

/// Public argument words settable through `dispatch`/`emit`.
pub const TASK_PUBLIC_ARGS: usize = 3;

/// Task identity. Non-zero, monotone; never reused while linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u32);

impl TaskId {
    /// Raw non-zero id value.
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Lifecycle state of a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Slot not allocated.
    Unused,
    /// Created, not yet released to a ready queue.
    NotStarted,
    /// In a ready queue, waiting for a dispatcher.
    Ready,
    /// Body executing on a dispatcher core.
    Running,
    /// Held back by `stop`; not dispatched until resumed.
    Stopped,
    /// Terminal: body exited Success or Finish.
    Completed,
    /// Terminal: body exited Error.
    Error,
    /// Terminal: aborted by a failing ancestor or by Abort.
    Aborted,
}

impl TaskState {
    /// Completed, Error and Aborted are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Aborted)
    }
}

/// Edge flavor: does the edge outlive the parent's episode?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// Persists until explicitly disconnected.
    Hard,
    /// Severed automatically when the parent reaches a terminal state.
    Soft,
}

/// Which exit action fires an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fires on Success.
    Default,
    /// Fires on Continue (loop-back edges).
    Continue,
    /// Fires on Finish.
    Finish,
    /// Fires on Again.
    Again,
    /// Fires on Error / Abort.
    Error,
}

/// Management action a body declares on exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Management {
    /// Fire Default children, complete, release the waiter.
    Success,
    /// Re-enqueue this task at the tail of its queue.
    Again,
    /// Park the task until `resume`; no waiter release.
    Stop,
    /// Re-dispatch after the task's period elapses.
    Periodic,
    /// Terminal failure; abort dependents.
    Abort,
    /// Terminal failure; fire Error children, abort dependents.
    Error,
    /// Fire Finish children, complete, release the waiter.
    Finish,
    /// Fire Continue children and re-arm; do not release the waiter.
    Continue,
}

/// How a firing parent rewrites its children's argument windows.
#[derive(Clone, Copy)]
pub enum Publish {
    /// Children keep their own arguments.
    Keep,
    /// Overwrite the first `len` words of each fired child.
    Words { len: usize, words: [Word; TASK_ARGS] },
    /// Custom merge: `(child_args, parent_args)`.
    Merge(fn(&mut [Word; TASK_ARGS], &[Word; TASK_ARGS])),
}

/// What a body hands back to the dispatcher.
#[derive(Clone, Copy)]
pub struct TaskExit {
    pub management: Management,
    pub retval: i32,
    pub publish: Publish,
}

impl TaskExit {
    const fn new(management: Management, retval: i32) -> Self {
        Self {
            management,
            retval,
            publish: Publish::Keep,
        }
    }

    pub const fn success(retval: i32) -> Self {
        Self::new(Management::Success, retval)
    }

    pub const fn again() -> Self {
        Self::new(Management::Again, 0)
    }

    pub const fn stop() -> Self {
        Self::new(Management::Stop, 0)
    }

    pub const fn periodic(retval: i32) -> Self {
        Self::new(Management::Periodic, retval)
    }

    pub const fn abort(retval: i32) -> Self {
        Self::new(Management::Abort, retval)
    }

    pub const fn error(retval: i32) -> Self {
        Self::new(Management::Error, retval)
    }

    pub const fn finish(retval: i32) -> Self {
        Self::new(Management::Finish, retval)
    }

    pub const fn cont(retval: i32) -> Self {
        Self::new(Management::Continue, retval)
    }

    /// Overwrite the first word of every fired child.
    pub const fn publish1(mut self, w0: Word) -> Self {
        self.publish = Publish::Words {
            len: 1,
            words: [w0, 0, 0, 0, 0],
        };
        self
    }

    /// Overwrite the public window of every fired child.
    pub const fn publish3(mut self, w0: Word, w1: Word, w2: Word) -> Self {
        self.publish = Publish::Words {
            len: 3,
            words: [w0, w1, w2, 0, 0],
        };
        self
    }

    /// Attach a custom merge function.
    pub const fn merge(mut self, f: fn(&mut [Word; TASK_ARGS], &[Word; TASK_ARGS])) -> Self {
        self.publish = Publish::Merge(f);
        self
    }
}

/// Execution context handed to a body.
pub struct TaskRun<'a> {
    /// The owning runtime; bodies reach the gate and the flow pools
    /// through it.
    pub rt: &'a crate::runtime::Runtime,
    /// Identity of the running task.
    pub id: TaskId,
    /// Dispatcher core executing the body.
    pub core: usize,
    /// Argument window (public + internal words).
    pub args: [Word; TASK_ARGS],
}

/// A task body: plain function pointer, machine-word in, exit action out.
pub type TaskFn = fn(&TaskRun<'_>) -> TaskExit;

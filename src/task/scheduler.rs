//! DAG storage and the dispatcher loop.
//!
//! All graph state lives in one fixed table of task slots guarded by a
//! single spinlock; bodies execute with the lock released. Each core
//! owns a bounded ready queue and one dispatcher thread that drains it
//! cooperatively: pop, run the body to completion, interpret the exit
//! action, loop. An idle dispatcher parks; `dispatch`/`emit` unpark the
//! owning core.
//!
//! Episode discipline: a task may be driven through the graph many
//! times (the flow engine re-dispatches the same `config`/`wait` pair
//! for every transfer). Out-edge `fired` flags are reset when their
//! owner is activated; the parent-pending counter of a task is restored
//! from its hard Default in-edges when its episode ends. Dispatching a
//! task whose counter is non-zero is refused with `Busy`.

use std::thread::{self, Thread};
use std::time::Duration;

use heapless::{Deque, Vec};

use super::{
    Dependency, Management, Publish, TASK_ARGS, TASK_PUBLIC_ARGS, TaskExit, TaskFn, TaskId,
    TaskRun, TaskState, Trigger,
};
use crate::config::{
    CORES_MAX, READY_QUEUE_DEPTH, TASK_CHILDREN_MAX, TASK_MAX, TASK_PARENTS_MAX,
};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::sys::Word;
use crate::thread::completion::Completion;

// ── Graph storage ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Edge {
    child: TaskId,
    dependency: Dependency,
    trigger: Trigger,
    /// Set when this edge fires during the owner's current episode.
    fired: bool,
}

#[derive(Debug, Clone, Copy)]
struct ParentRef {
    parent: TaskId,
    dependency: Dependency,
    trigger: Trigger,
}

struct TaskSlot {
    /// Non-zero id; 0 marks the slot free.
    id: u32,
    fun: Option<TaskFn>,
    args: [Word; TASK_ARGS],
    retval: i32,
    state: TaskState,
    period: u32,
    /// Tick at which a periodic task re-enters the ready queue; 0 = none.
    deferred_until: u64,
    /// Hard Default in-edges not yet fired this episode.
    pending: u32,
    /// A trigger-matching fire event has been seen this episode.
    fired_event: bool,
    /// Whether `stop` interrupted a Ready task (resume re-enqueues).
    stopped_was_ready: bool,
    /// Ready queue this task is dispatched on.
    core: usize,
    children: Vec<Edge, TASK_CHILDREN_MAX>,
    parents: Vec<ParentRef, TASK_PARENTS_MAX>,
}

impl TaskSlot {
    fn free() -> Self {
        Self {
            id: 0,
            fun: None,
            args: [0; TASK_ARGS],
            retval: 0,
            state: TaskState::Unused,
            period: 0,
            deferred_until: 0,
            pending: 0,
            fired_event: false,
            stopped_was_ready: false,
            core: 0,
            children: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Hard Default in-edges; the value `pending` is restored to.
    fn hard_parent_count(&self) -> u32 {
        self.parents
            .iter()
            .filter(|p| p.dependency == Dependency::Hard && p.trigger == Trigger::Default)
            .count() as u32
    }
}

struct Inner {
    slots: [TaskSlot; TASK_MAX],
    queues: [Deque<TaskId, READY_QUEUE_DEPTH>; CORES_MAX],
    wakers: [Option<Thread>; CORES_MAX],
    current: [Option<TaskId>; CORES_MAX],
    online: usize,
    tick: u64,
    next_id: u32,
}

impl Inner {
    fn index_of(&self, id: TaskId) -> Option<usize> {
        if id.0 == 0 {
            return None;
        }
        self.slots.iter().position(|s| s.id == id.0)
    }

    /// Whether the calling thread is one of the dispatcher threads.
    fn is_dispatcher_thread(&self) -> bool {
        let me = thread::current().id();
        self.wakers.iter().flatten().any(|t| t.id() == me)
    }

    fn core_of_current(&self) -> Option<usize> {
        let me = thread::current().id();
        self.wakers
            .iter()
            .position(|w| w.as_ref().is_some_and(|t| t.id() == me))
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// Task scheduler: DAG storage plus one dispatcher loop per core.
pub struct Scheduler {
    cores: usize,
    idle_park: Duration,
    inner: spin::Mutex<Inner>,
    /// Completion gates live outside the spinlock so `wait` can suspend
    /// without holding graph state.
    completions: [Completion; TASK_MAX],
}

impl Scheduler {
    pub fn new(cores: usize, idle_park_us: u64) -> Self {
        Self {
            cores,
            idle_park: Duration::from_micros(idle_park_us),
            inner: spin::Mutex::new(Inner {
                slots: core::array::from_fn(|_| TaskSlot::free()),
                queues: core::array::from_fn(|_| Deque::new()),
                wakers: [const { None }; CORES_MAX],
                current: [None; CORES_MAX],
                online: 0,
                tick: 0,
                next_id: 1,
            }),
            completions: [const { Completion::new() }; TASK_MAX],
        }
    }

    /// Number of dispatcher cores this scheduler drives.
    pub fn cores(&self) -> usize {
        self.cores
    }

    /// Dispatchers that have entered their loop.
    pub(crate) fn online(&self) -> usize {
        self.inner.lock().online
    }

    pub(crate) fn is_dispatcher_thread(&self) -> bool {
        self.inner.lock().is_dispatcher_thread()
    }

    // ── Graph construction ────────────────────────────────────

    /// Allocate a task with a fresh id. `Busy` when the table is full.
    pub fn create(&self, fun: TaskFn, period: u32) -> Result<TaskId> {
        let mut inner = self.inner.lock();
        let Some(idx) = inner.slots.iter().position(|s| s.id == 0) else {
            return Err(Error::Busy);
        };

        let id = inner.next_id;
        inner.next_id = inner.next_id.wrapping_add(1).max(1);

        let slot = &mut inner.slots[idx];
        *slot = TaskSlot::free();
        slot.id = id;
        slot.fun = Some(fun);
        slot.period = period;
        slot.state = TaskState::NotStarted;
        self.completions[idx].reset();

        Ok(TaskId(id))
    }

    /// Release a task slot.
    ///
    /// Refused with `Busy` while any connected edge has a live
    /// (non-terminal) peer; terminal peers are silently disconnected.
    pub fn unlink(&self, id: TaskId) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;

        if matches!(inner.slots[idx].state, TaskState::Ready | TaskState::Running) {
            return Err(Error::Busy);
        }

        // Every edge peer must be terminal or gone.
        for pi in 0..inner.slots[idx].parents.len() {
            let p = inner.slots[idx].parents[pi].parent;
            if let Some(pidx) = inner.index_of(p) {
                if !inner.slots[pidx].state.is_terminal() {
                    return Err(Error::Busy);
                }
            }
        }
        for ci in 0..inner.slots[idx].children.len() {
            let c = inner.slots[idx].children[ci].child;
            if let Some(cidx) = inner.index_of(c) {
                if !inner.slots[cidx].state.is_terminal() {
                    return Err(Error::Busy);
                }
            }
        }

        // Drop remaining edges from both sides.
        for pi in 0..inner.slots[idx].parents.len() {
            let p = inner.slots[idx].parents[pi].parent;
            if let Some(pidx) = inner.index_of(p) {
                inner.slots[pidx].children.retain(|e| e.child != id);
            }
        }
        for ci in 0..inner.slots[idx].children.len() {
            let c = inner.slots[idx].children[ci].child;
            if let Some(cidx) = inner.index_of(c) {
                inner.slots[cidx].parents.retain(|p| p.parent != id);
                let restored = inner.slots[cidx].hard_parent_count();
                if !matches!(inner.slots[cidx].state, TaskState::Ready | TaskState::Running) {
                    inner.slots[cidx].pending = restored;
                }
            }
        }

        inner.slots[idx] = TaskSlot::free();
        self.completions[idx].reset();
        Ok(())
    }

    /// Append a directed edge `parent → child`.
    ///
    /// `Inval` on self-edges, duplicates, unknown tasks, or cycles;
    /// `Busy` when either endpoint's edge table is full.
    pub fn connect(
        &self,
        parent: TaskId,
        child: TaskId,
        dependency: Dependency,
        trigger: Trigger,
    ) -> Result<()> {
        if parent == child {
            return Err(Error::Inval);
        }

        let mut inner = self.inner.lock();
        let pidx = inner.index_of(parent).ok_or(Error::Inval)?;
        let cidx = inner.index_of(child).ok_or(Error::Inval)?;

        if inner.slots[pidx].children.iter().any(|e| e.child == child) {
            return Err(Error::Inval);
        }
        if inner.slots[pidx].children.is_full() || inner.slots[cidx].parents.is_full() {
            return Err(Error::Busy);
        }

        // Reject cycles: the parent must not be reachable from the child.
        if self.reaches(&inner, cidx, pidx) {
            return Err(Error::Inval);
        }

        let _ = inner.slots[pidx].children.push(Edge {
            child,
            dependency,
            trigger,
            fired: false,
        });
        let _ = inner.slots[cidx].parents.push(ParentRef {
            parent,
            dependency,
            trigger,
        });

        if dependency == Dependency::Hard && trigger == Trigger::Default {
            inner.slots[cidx].pending += 1;
        }
        Ok(())
    }

    /// Remove the edge `parent → child`. `Inval` if no such edge.
    pub fn disconnect(&self, parent: TaskId, child: TaskId) -> Result<()> {
        let mut inner = self.inner.lock();
        let pidx = inner.index_of(parent).ok_or(Error::Inval)?;
        let cidx = inner.index_of(child).ok_or(Error::Inval)?;

        let Some(ei) = inner.slots[pidx]
            .children
            .iter()
            .position(|e| e.child == child)
        else {
            return Err(Error::Inval);
        };
        let edge = inner.slots[pidx].children[ei];
        inner.slots[pidx].children.remove(ei);
        inner.slots[cidx].parents.retain(|p| p.parent != parent);

        // An unfired hard Default edge was still counted.
        if edge.dependency == Dependency::Hard && edge.trigger == Trigger::Default && !edge.fired {
            inner.slots[cidx].pending = inner.slots[cidx].pending.saturating_sub(1);
        }
        Ok(())
    }

    /// Depth-first reachability over out-edges.
    fn reaches(&self, inner: &Inner, from: usize, target: usize) -> bool {
        let mut visited = [false; TASK_MAX];
        let mut stack = [0usize; TASK_MAX];
        let mut sp = 0;

        stack[sp] = from;
        sp += 1;
        visited[from] = true;

        while sp > 0 {
            sp -= 1;
            let idx = stack[sp];
            if idx == target {
                return true;
            }
            for e in &inner.slots[idx].children {
                if let Some(ci) = inner.index_of(e.child) {
                    if !visited[ci] {
                        visited[ci] = true;
                        stack[sp] = ci;
                        sp += 1;
                    }
                }
            }
        }
        false
    }

    // ── Dispatch ──────────────────────────────────────────────

    /// Set the public argument window, mark Ready, enqueue.
    pub fn dispatch(&self, id: TaskId, a0: Word, a1: Word, a2: Word) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;
        let core = inner.slots[idx].core;
        self.activate(&mut inner, idx, core, [a0, a1, a2])
    }

    /// Like [`dispatch`](Self::dispatch) but pinned to `core`'s queue.
    pub fn emit(&self, id: TaskId, core: usize, a0: Word, a1: Word, a2: Word) -> Result<()> {
        if core >= self.cores {
            return Err(Error::Inval);
        }
        let mut inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;
        inner.slots[idx].core = core;
        self.activate(&mut inner, idx, core, [a0, a1, a2])
    }

    fn activate(
        &self,
        inner: &mut Inner,
        idx: usize,
        core: usize,
        public: [Word; TASK_PUBLIC_ARGS],
    ) -> Result<()> {
        let slot = &mut inner.slots[idx];
        match slot.state {
            TaskState::NotStarted | TaskState::Completed | TaskState::Error
            | TaskState::Aborted => {}
            TaskState::Unused => return Err(Error::Inval),
            TaskState::Ready | TaskState::Running | TaskState::Stopped => {
                return Err(Error::Busy);
            }
        }
        if slot.pending > 0 {
            return Err(Error::Busy);
        }

        slot.args[..TASK_PUBLIC_ARGS].copy_from_slice(&public);
        slot.retval = 0;
        slot.deferred_until = 0;
        slot.fired_event = false;
        for e in slot.children.iter_mut() {
            e.fired = false;
        }
        slot.state = TaskState::Ready;
        self.completions[idx].reset();

        let id = TaskId(slot.id);
        if inner.queues[core].push_back(id).is_err() {
            inner.slots[idx].state = TaskState::NotStarted;
            return Err(Error::Busy);
        }
        self.wake(inner, core);
        Ok(())
    }

    /// Set the internal argument words (op-code and pool tag) that
    /// survive re-dispatch. Flow wiring only.
    pub(crate) fn set_internal_args(&self, id: TaskId, w3: Word, w4: Word) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;
        inner.slots[idx].args[TASK_PUBLIC_ARGS] = w3;
        inner.slots[idx].args[TASK_PUBLIC_ARGS + 1] = w4;
        Ok(())
    }

    // ── Waiters ───────────────────────────────────────────────

    /// Suspend until the task reaches a terminal state; returns its
    /// signed return value. Forbidden on dispatcher threads (`Proto`) —
    /// a suspended dispatcher would starve its own queue.
    pub fn wait(&self, id: TaskId) -> Result<i32> {
        let idx = {
            let inner = self.inner.lock();
            if inner.is_dispatcher_thread() {
                return Err(Error::Proto);
            }
            inner.index_of(id).ok_or(Error::Inval)?
        };

        let val = self.completions[idx].wait();
        self.rearm_after_wait(id);
        Ok(val)
    }

    /// Non-suspending completion probe; `Proto` when not yet complete.
    pub fn try_wait(&self, id: TaskId) -> Result<i32> {
        let idx = {
            let inner = self.inner.lock();
            inner.index_of(id).ok_or(Error::Inval)?
        };

        let val = self.completions[idx].try_wait()?;
        self.rearm_after_wait(id);
        Ok(val)
    }

    /// A consumed completion leaves the task re-dispatchable.
    fn rearm_after_wait(&self, id: TaskId) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.index_of(id) {
            if inner.slots[idx].state.is_terminal() {
                inner.slots[idx].state = TaskState::NotStarted;
            }
        }
    }

    // ── Stop / resume ─────────────────────────────────────────

    /// Park a task: it will not be dispatched until resumed.
    pub fn stop(&self, id: TaskId) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;
        match inner.slots[idx].state {
            TaskState::Ready => {
                inner.slots[idx].state = TaskState::Stopped;
                inner.slots[idx].stopped_was_ready = true;
                Ok(())
            }
            TaskState::NotStarted => {
                inner.slots[idx].state = TaskState::Stopped;
                inner.slots[idx].stopped_was_ready = false;
                Ok(())
            }
            TaskState::Running => Err(Error::Busy),
            _ => Err(Error::Inval),
        }
    }

    /// Resume a stopped task. One stopped from the ready queue (or from
    /// its own body via Stop) re-enters it; one stopped before dispatch
    /// returns to NotStarted.
    pub fn resume(&self, id: TaskId) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;
        if inner.slots[idx].state != TaskState::Stopped {
            return Err(Error::Inval);
        }

        if inner.slots[idx].stopped_was_ready {
            inner.slots[idx].state = TaskState::Ready;
            let core = inner.slots[idx].core;
            let qid = TaskId(inner.slots[idx].id);
            if inner.queues[core].push_back(qid).is_err() {
                inner.slots[idx].state = TaskState::Stopped;
                return Err(Error::Busy);
            }
            self.wake(&mut inner, core);
        } else {
            inner.slots[idx].state = TaskState::NotStarted;
        }
        Ok(())
    }

    // ── Introspection ─────────────────────────────────────────

    /// Task currently executing on the calling dispatcher thread.
    pub fn current(&self) -> Option<TaskId> {
        let inner = self.inner.lock();
        inner.core_of_current().and_then(|core| inner.current[core])
    }

    pub fn state(&self, id: TaskId) -> Result<TaskState> {
        let inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;
        Ok(inner.slots[idx].state)
    }

    pub fn get_return(&self, id: TaskId) -> Result<i32> {
        let inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;
        Ok(inner.slots[idx].retval)
    }

    pub fn set_period(&self, id: TaskId, period: u32) -> Result<()> {
        let mut inner = self.inner.lock();
        let idx = inner.index_of(id).ok_or(Error::Inval)?;
        inner.slots[idx].period = period;
        Ok(())
    }

    // ── Dispatcher loop ───────────────────────────────────────

    /// Drive core `core` until the runtime shuts down. Called from the
    /// dedicated dispatcher thread spawned at launch.
    pub(crate) fn run_dispatcher(&self, rt: &Runtime, core: usize) {
        {
            let mut inner = self.inner.lock();
            inner.wakers[core] = Some(thread::current());
            inner.online += 1;
        }
        log::info!("task: dispatcher online on core {}", core);

        while !rt.is_shutting_down() {
            let work = {
                let mut inner = self.inner.lock();
                inner.tick += 1;
                self.promote_due(&mut inner);
                self.next_ready(&mut inner, core)
            };

            match work {
                Some((id, fun, args)) => {
                    let exit = fun(&TaskRun {
                        rt,
                        id,
                        core,
                        args,
                    });
                    let mut inner = self.inner.lock();
                    if let Some(idx) = inner.index_of(id) {
                        self.apply_exit(&mut inner, idx, core, &exit, &args);
                    }
                    inner.current[core] = None;
                }
                None => thread::park_timeout(self.idle_park),
            }
        }

        {
            let mut inner = self.inner.lock();
            inner.wakers[core] = None;
            inner.online -= 1;
        }
        log::info!("task: dispatcher on core {} stopped", core);
    }

    /// Move periodic tasks whose tick has arrived into their queues.
    fn promote_due(&self, inner: &mut Inner) {
        let now = inner.tick;
        for idx in 0..TASK_MAX {
            let slot = &inner.slots[idx];
            if slot.id == 0 || slot.deferred_until == 0 || slot.deferred_until > now {
                continue;
            }
            if slot.state != TaskState::NotStarted {
                continue;
            }
            inner.slots[idx].deferred_until = 0;
            self.make_ready(inner, idx);
        }
    }

    /// Pop the next runnable task off `core`'s queue.
    fn next_ready(
        &self,
        inner: &mut Inner,
        core: usize,
    ) -> Option<(TaskId, TaskFn, [Word; TASK_ARGS])> {
        while let Some(id) = inner.queues[core].pop_front() {
            let Some(idx) = inner.index_of(id) else {
                continue; // Unlinked while queued.
            };
            if inner.slots[idx].state != TaskState::Ready {
                continue; // Stopped or stale entry.
            }
            let Some(fun) = inner.slots[idx].fun else {
                continue;
            };
            inner.slots[idx].state = TaskState::Running;
            inner.current[core] = Some(id);
            return Some((id, fun, inner.slots[idx].args));
        }
        None
    }

    // ── Exit interpretation ───────────────────────────────────

    fn apply_exit(
        &self,
        inner: &mut Inner,
        idx: usize,
        core: usize,
        exit: &TaskExit,
        args: &[Word; TASK_ARGS],
    ) {
        inner.slots[idx].retval = exit.retval;

        match exit.management {
            Management::Success => {
                self.fire_children(inner, idx, Trigger::Default, exit, args);
                self.settle(inner, idx, TaskState::Completed);
            }
            Management::Finish => {
                self.fire_children(inner, idx, Trigger::Finish, exit, args);
                self.settle(inner, idx, TaskState::Completed);
            }
            Management::Continue => {
                self.fire_children(inner, idx, Trigger::Continue, exit, args);
                // Re-arm without completing: the loop partner will fire
                // this task again and no waiter is released.
                let restored = inner.slots[idx].hard_parent_count();
                inner.slots[idx].pending = restored;
                inner.slots[idx].fired_event = false;
                inner.slots[idx].state = TaskState::NotStarted;
            }
            Management::Again => {
                self.fire_children(inner, idx, Trigger::Again, exit, args);
                inner.slots[idx].state = TaskState::Ready;
                let id = TaskId(inner.slots[idx].id);
                if inner.queues[core].push_back(id).is_err() {
                    log::error!("task: ready queue {} full on AGAIN re-enqueue", core);
                    inner.slots[idx].state = TaskState::NotStarted;
                }
            }
            Management::Periodic => {
                let period = u64::from(inner.slots[idx].period.max(1));
                inner.slots[idx].state = TaskState::NotStarted;
                inner.slots[idx].deferred_until = inner.tick + period;
            }
            Management::Stop => {
                inner.slots[idx].state = TaskState::Stopped;
                inner.slots[idx].stopped_was_ready = true;
            }
            Management::Error => {
                self.fire_children(inner, idx, Trigger::Error, exit, args);
                self.fail(inner, idx, TaskState::Error, exit.retval);
            }
            Management::Abort => {
                self.fire_children(inner, idx, Trigger::Error, exit, args);
                self.fail(inner, idx, TaskState::Aborted, exit.retval);
            }
        }
    }

    /// Fire every unfired out-edge matching `trigger`, in insertion
    /// order, merging arguments and releasing children whose parent
    /// counter reaches zero.
    fn fire_children(
        &self,
        inner: &mut Inner,
        pidx: usize,
        trigger: Trigger,
        exit: &TaskExit,
        parent_args: &[Word; TASK_ARGS],
    ) {
        for ei in 0..inner.slots[pidx].children.len() {
            let edge = inner.slots[pidx].children[ei];
            if edge.trigger != trigger || edge.fired {
                continue;
            }
            inner.slots[pidx].children[ei].fired = true;

            let Some(cidx) = inner.index_of(edge.child) else {
                continue;
            };

            match exit.publish {
                Publish::Keep => {}
                Publish::Words { len, words } => {
                    inner.slots[cidx].args[..len].copy_from_slice(&words[..len]);
                }
                Publish::Merge(f) => {
                    let mut merged = inner.slots[cidx].args;
                    f(&mut merged, parent_args);
                    inner.slots[cidx].args = merged;
                }
            }

            if edge.dependency == Dependency::Hard && edge.trigger == Trigger::Default {
                inner.slots[cidx].pending = inner.slots[cidx].pending.saturating_sub(1);
            }
            inner.slots[cidx].fired_event = true;

            // Ready iff the hard-Default counter is exhausted and a
            // trigger-matching fire event has been seen this episode.
            let st = inner.slots[cidx].state;
            let eligible = st == TaskState::NotStarted || st.is_terminal();
            if inner.slots[cidx].pending == 0 && inner.slots[cidx].fired_event && eligible {
                self.make_ready(inner, cidx);
            }
        }
    }

    /// Begin a new episode for a released task.
    fn make_ready(&self, inner: &mut Inner, idx: usize) {
        inner.slots[idx].state = TaskState::Ready;
        inner.slots[idx].fired_event = false;
        inner.slots[idx].retval = 0;
        for e in inner.slots[idx].children.iter_mut() {
            e.fired = false;
        }

        let core = inner.slots[idx].core.min(self.cores - 1);
        let id = TaskId(inner.slots[idx].id);
        if inner.queues[core].push_back(id).is_err() {
            log::error!("task: ready queue {} full, fire of task {} lost", core, id.0);
            inner.slots[idx].state = TaskState::NotStarted;
            return;
        }
        self.wake(inner, core);
    }

    /// Terminal bookkeeping shared by Success/Finish/Error/Abort: sever
    /// soft out-edges, restore the parent counter for the next episode,
    /// record the state and release the waiter.
    fn settle(&self, inner: &mut Inner, idx: usize, state: TaskState) {
        self.sever_soft(inner, idx);

        let restored = inner.slots[idx].hard_parent_count();
        inner.slots[idx].pending = restored;
        inner.slots[idx].fired_event = false;
        inner.slots[idx].state = state;

        let retval = inner.slots[idx].retval;
        self.completions[idx].post(retval);
    }

    /// Terminal failure: settle, then abort every dependent still
    /// waiting on this task so their waiters observe the real cause.
    fn fail(&self, inner: &mut Inner, idx: usize, state: TaskState, code: i32) {
        self.settle(inner, idx, state);

        let mut stack = [0usize; TASK_MAX];
        let mut sp = 0;
        stack[sp] = idx;
        sp += 1;

        while sp > 0 {
            sp -= 1;
            let pidx = stack[sp];
            for ei in 0..inner.slots[pidx].children.len() {
                let edge = inner.slots[pidx].children[ei];
                let downstream = edge.dependency == Dependency::Hard
                    && matches!(edge.trigger, Trigger::Default | Trigger::Finish)
                    && !edge.fired;
                if !downstream {
                    continue;
                }
                let Some(cidx) = inner.index_of(edge.child) else {
                    continue;
                };
                if inner.slots[cidx].state != TaskState::NotStarted {
                    continue; // Independently active or already settled.
                }

                log::error!(
                    "task: aborting task {} after failure of task {} ({})",
                    inner.slots[cidx].id,
                    inner.slots[pidx].id,
                    code
                );
                inner.slots[cidx].retval = code;
                let restored = inner.slots[cidx].hard_parent_count();
                inner.slots[cidx].pending = restored;
                inner.slots[cidx].fired_event = false;
                inner.slots[cidx].state = TaskState::Aborted;
                self.completions[cidx].post(code);

                if sp < TASK_MAX {
                    stack[sp] = cidx;
                    sp += 1;
                }
            }
        }
    }

    /// Soft children do not survive their parent's terminal transition.
    fn sever_soft(&self, inner: &mut Inner, idx: usize) {
        let id = TaskId(inner.slots[idx].id);
        let soft: std::vec::Vec<TaskId> = inner.slots[idx]
            .children
            .iter()
            .filter(|e| e.dependency == Dependency::Soft)
            .map(|e| e.child)
            .collect();

        inner.slots[idx]
            .children
            .retain(|e| e.dependency != Dependency::Soft);

        for child in soft {
            if let Some(cidx) = inner.index_of(child) {
                inner.slots[cidx].parents.retain(|p| p.parent != id);
            }
        }
    }

    fn wake(&self, inner: &mut Inner, core: usize) {
        if let Some(t) = &inner.wakers[core] {
            t.unpark();
        }
    }

    /// Unpark every dispatcher (shutdown path).
    pub(crate) fn wake_all(&self) {
        let inner = self.inner.lock();
        for t in inner.wakers.iter().flatten() {
            t.unpark();
        }
    }
}

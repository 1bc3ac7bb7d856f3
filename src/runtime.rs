//! The runtime process object.
//!
//! One `Runtime` per NoC node process. It owns the kernel-call gate,
//! the task scheduler with its dispatcher threads, the flow pools, the
//! communicator tables and the thread registry, and exposes the whole
//! user API (mailbox/portal/sync/barrier/task operations are attached
//! in their modules).
//!
//! ```text
//!   user threads ──▶ Runtime ──▶ flow engine ──▶ scheduler ──▶ gate
//!                      │                            ▲
//!                      └── dispatcher threads ──────┘
//! ```
//!
//! `launch` spawns the dispatchers and blocks until each has entered
//! its loop; `shutdown` stops and joins them. Shut down only when no
//! flow is in flight — the runtime never cancels a communication
//! mid-way.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::comm::CommTable;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::flow::FlowEngine;
use crate::sys::{KernelGate, calls};
use crate::task::scheduler::Scheduler;
use crate::task::{Dependency, TaskFn, TaskId, TaskState, Trigger};
use crate::thread::{ThreadRegistry, spawn_on_core};

/// Per-node runtime instance.
pub struct Runtime {
    gate: Arc<dyn KernelGate>,
    node: i32,
    sched: Scheduler,
    flows: FlowEngine,
    mailboxes: CommTable,
    portals: CommTable,
    threads: ThreadRegistry,
    shutting_down: AtomicBool,
    dispatchers: spin::Mutex<Vec<JoinHandle<()>>>,
}

impl Runtime {
    /// Bring a runtime up on the given gate: build the flow pools,
    /// spawn one dispatcher per configured core, and wait until every
    /// dispatcher is online.
    pub fn launch(cfg: &RuntimeConfig, gate: Arc<dyn KernelGate>) -> Result<Arc<Self>> {
        cfg.validate()?;

        let node = calls::node_get_num(gate.as_ref());
        let sched = Scheduler::new(cfg.cores, cfg.idle_park_us);
        let flows = FlowEngine::new(&sched)?;

        let rt = Arc::new(Self {
            gate,
            node,
            sched,
            flows,
            mailboxes: CommTable::new("mailbox"),
            portals: CommTable::new("portal"),
            threads: ThreadRegistry::new(),
            shutting_down: AtomicBool::new(false),
            dispatchers: spin::Mutex::new(Vec::new()),
        });

        for core in 0..cfg.cores {
            let me = Arc::clone(&rt);
            let handle = spawn_on_core(core, &format!("ikc-disp{}", core), move || {
                me.sched.run_dispatcher(&me, core);
            });
            rt.dispatchers.lock().push(handle);
        }

        // The user API must not race dispatcher registration.
        while rt.sched.online() < cfg.cores {
            std::thread::yield_now();
        }

        log::info!(
            "runtime: node {} online with {} dispatcher core(s)",
            node,
            cfg.cores
        );
        Ok(rt)
    }

    /// Stop and join every dispatcher. Idempotent.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sched.wake_all();

        let handles: Vec<JoinHandle<()>> = self.dispatchers.lock().drain(..).collect();
        for h in handles {
            let _ = h.join();
        }
        log::info!("runtime: node {} offline", self.node);
    }

    // ── Identity ──────────────────────────────────────────────

    /// Logic id of the local NoC node.
    pub fn node(&self) -> i32 {
        self.node
    }

    /// Whether the calling thread is one of this runtime's dispatchers.
    pub fn is_dispatcher(&self) -> bool {
        self.sched.is_dispatcher_thread()
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    // ── Component access ──────────────────────────────────────

    pub(crate) fn gate(&self) -> &dyn KernelGate {
        self.gate.as_ref()
    }

    pub(crate) fn sched(&self) -> &Scheduler {
        &self.sched
    }

    pub(crate) fn flows(&self) -> &FlowEngine {
        &self.flows
    }

    pub(crate) fn mailboxes(&self) -> &CommTable {
        &self.mailboxes
    }

    pub(crate) fn portals(&self) -> &CommTable {
        &self.portals
    }

    pub(crate) fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    // ── Task API ──────────────────────────────────────────────

    /// Create a task with a fresh id.
    pub fn task_create(&self, fun: TaskFn, period: u32) -> Result<TaskId> {
        self.sched.create(fun, period)
    }

    /// Release a task slot; refused while live edges remain.
    pub fn task_unlink(&self, id: TaskId) -> Result<()> {
        self.sched.unlink(id)
    }

    /// Add a dependency edge `parent → child`.
    pub fn task_connect(
        &self,
        parent: TaskId,
        child: TaskId,
        dependency: Dependency,
        trigger: Trigger,
    ) -> Result<()> {
        self.sched.connect(parent, child, dependency, trigger)
    }

    /// Remove the edge `parent → child`.
    pub fn task_disconnect(&self, parent: TaskId, child: TaskId) -> Result<()> {
        self.sched.disconnect(parent, child)
    }

    /// Set arguments and enqueue on the default dispatcher queue.
    pub fn task_dispatch(&self, id: TaskId, a0: usize, a1: usize, a2: usize) -> Result<()> {
        self.sched.dispatch(id, a0, a1, a2)
    }

    /// Set arguments and enqueue on a specific core's queue.
    pub fn task_emit(&self, id: TaskId, core: usize, a0: usize, a1: usize, a2: usize) -> Result<()> {
        self.sched.emit(id, core, a0, a1, a2)
    }

    /// Suspend until the task completes; returns its signed return
    /// value. `Proto` on dispatcher threads — use
    /// [`task_try_wait`](Self::task_try_wait) there.
    pub fn task_wait(&self, id: TaskId) -> Result<i32> {
        self.sched.wait(id)
    }

    /// Non-suspending completion probe.
    pub fn task_try_wait(&self, id: TaskId) -> Result<i32> {
        self.sched.try_wait(id)
    }

    /// Park a task until resumed.
    pub fn task_stop(&self, id: TaskId) -> Result<()> {
        self.sched.stop(id)
    }

    /// Resume a stopped task.
    pub fn task_resume(&self, id: TaskId) -> Result<()> {
        self.sched.resume(id)
    }

    /// Task executing on the calling dispatcher thread, if any.
    pub fn task_current(&self) -> Option<TaskId> {
        self.sched.current()
    }

    /// Last return value recorded for a task.
    pub fn task_return(&self, id: TaskId) -> Result<i32> {
        self.sched.get_return(id)
    }

    /// Current lifecycle state of a task.
    pub fn task_state(&self, id: TaskId) -> Result<TaskState> {
        self.sched.state(id)
    }

    /// Change a task's re-dispatch period.
    pub fn task_set_period(&self, id: TaskId, period: u32) -> Result<()> {
        self.sched.set_period(id, period)
    }
}

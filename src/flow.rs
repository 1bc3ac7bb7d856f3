//! IKC flow engine.
//!
//! Every user read/write on a mailbox or portal is decomposed into a
//! two-task micro-graph that the dispatcher drives to completion:
//!
//! ```text
//!             +--------- Continue ----------+
//!             v                             |
//!         config  ── Success ──────────▶  wait
//!         (Again re-enqueues self)        (Finish releases the waiter,
//!                                          Error aborts the chain)
//! ```
//!
//! `config` issues the raw asynchronous operation and maps transient
//! conditions to AGAIN so the scheduler retries through its queue — a
//! retry never re-enters a body on the same call stack. `wait` probes
//! completion; a positive probe ("delivered to another port") loops
//! back into `config` over the Continue edge.
//!
//! Graphs are wired once at launch and reused: only the argument
//! windows and the slot's kind/cid change per request. Slots come from
//! two disjoint pools — one for dispatcher-initiated flows keyed by
//! (kind, cid), one for user threads keyed by the caller's thread slot,
//! which is what enforces one in-flight flow per thread.

use crate::config::FLOWS_MAX;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::sys::{Word, calls};
use crate::task::{TaskExit, TaskId, TaskRun};

/// Sentinel for a slot with no communicator bound.
const CID_INVALID: Word = Word::MAX;

/// Pool tag carried in a flow task's internal argument word.
const POOL_DISPATCHER: Word = 0;
const POOL_USER: Word = 1;

/// What a flow slot is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    MailboxRead,
    MailboxWrite,
    PortalRead,
    PortalWrite,
}

impl FlowKind {
    fn is_mailbox(self) -> bool {
        matches!(self, Self::MailboxRead | Self::MailboxWrite)
    }
}

struct FlowSlot {
    kind: Option<FlowKind>,
    cid: Word,
    config: TaskId,
    wait: TaskId,
    last_return: i32,
    in_use: bool,
}

impl FlowSlot {
    fn release(&mut self) {
        self.kind = None;
        self.cid = CID_INVALID;
        self.in_use = false;
    }
}

struct Pools {
    dispatchers: [FlowSlot; FLOWS_MAX],
    users: [FlowSlot; FLOWS_MAX],
}

/// Flow pools plus the permanently wired task pairs.
pub struct FlowEngine {
    pools: spin::Mutex<Pools>,
}

impl FlowEngine {
    /// Build both pools and wire every `config`/`wait` pair.
    ///
    /// Called once at launch, before the dispatchers start. `Busy` if
    /// the task table cannot hold the flow graphs.
    pub(crate) fn new(sched: &crate::task::scheduler::Scheduler) -> Result<Self> {
        let dispatchers = Self::build_pool(sched, POOL_DISPATCHER)?;
        let users = Self::build_pool(sched, POOL_USER)?;
        Ok(Self {
            pools: spin::Mutex::new(Pools { dispatchers, users }),
        })
    }

    fn build_pool(
        sched: &crate::task::scheduler::Scheduler,
        tag: Word,
    ) -> Result<[FlowSlot; FLOWS_MAX]> {
        let mut slots: [Option<FlowSlot>; FLOWS_MAX] = [const { None }; FLOWS_MAX];

        for (i, out) in slots.iter_mut().enumerate() {
            let config = sched.create(flow_config_body, 0)?;
            let wait = sched.create(flow_wait_body, 0)?;

            sched.connect(
                config,
                wait,
                crate::task::Dependency::Hard,
                crate::task::Trigger::Default,
            )?;
            sched.connect(
                wait,
                config,
                crate::task::Dependency::Hard,
                crate::task::Trigger::Continue,
            )?;

            sched.set_internal_args(config, tag, i as Word)?;
            sched.set_internal_args(wait, tag, i as Word)?;

            *out = Some(FlowSlot {
                kind: None,
                cid: CID_INVALID,
                config,
                wait,
                last_return: 0,
                in_use: false,
            });
        }

        Ok(slots.map(|s| s.expect("flow: pool slot left unbuilt")))
    }

    /// Kind bound to the slot a flow body belongs to.
    ///
    /// Panics on a stale tag or an unbound slot: a flow body running
    /// against a slot that is not in use is a bug in the core, not a
    /// recoverable condition.
    fn slot_kind(&self, args: &[Word; crate::task::TASK_ARGS]) -> FlowKind {
        let tag = args[3];
        let idx = args[4];
        assert!(idx < FLOWS_MAX as Word, "flow: bad slot index {}", idx);

        let pools = self.pools.lock();
        let slot = match tag {
            POOL_DISPATCHER => &pools.dispatchers[idx],
            POOL_USER => &pools.users[idx],
            _ => panic!("flow: bad pool tag {}", tag),
        };
        assert!(slot.in_use, "flow: body ran against an unused slot");
        slot.kind.expect("flow: in-use slot with no kind")
    }

    // ── Public operations ─────────────────────────────────────

    /// Allocate a slot and dispatch the `config` task.
    ///
    /// User threads suspend here until the transfer completes and get
    /// `size` back; dispatcher threads return right after dispatch and
    /// observe completion through the graph.
    pub(crate) fn config(
        &self,
        rt: &Runtime,
        kind: FlowKind,
        cid: Word,
        buf: Word,
        size: Word,
    ) -> Result<Word> {
        let is_user = !rt.sched().is_dispatcher_thread();
        let user_slot = if is_user {
            Some(rt.threads().slot_of_current()?)
        } else {
            None
        };

        let (config, wait) = {
            let mut pools = self.pools.lock();
            let slot = match user_slot {
                Some(ti) => {
                    let s = &mut pools.users[ti];
                    // One in-flight flow per thread.
                    if s.in_use {
                        return Err(Error::Busy);
                    }
                    s
                }
                None => {
                    let mut free = None;
                    for (i, s) in pools.dispatchers.iter().enumerate() {
                        if !s.in_use {
                            free.get_or_insert(i);
                        } else if s.kind == Some(kind) && s.cid == cid {
                            // One in-flight flow per (kind, cid).
                            return Err(Error::Inval);
                        }
                    }
                    let Some(i) = free else {
                        return Err(Error::Busy);
                    };
                    &mut pools.dispatchers[i]
                }
            };

            slot.kind = Some(kind);
            slot.cid = cid;
            slot.last_return = 0;
            slot.in_use = true;
            (slot.config, slot.wait)
        };

        if let Err(e) = rt.sched().dispatch(config, cid, buf, size) {
            self.release_by_tasks(config);
            return Err(e);
        }

        if is_user {
            let ret = rt.sched().wait(wait)?;
            {
                let mut pools = self.pools.lock();
                pools.users[user_slot.expect("flow: user path without slot")].last_return = ret;
            }
            if ret < 0 {
                // The wait task aborts when config fails; surface the
                // configuration error and free the one-shot slot.
                let cfg_ret = rt.sched().get_return(config)?;
                if cfg_ret < 0 {
                    self.release_by_tasks(config);
                    return Err(Error::from_code(cfg_ret).unwrap_or(Error::Inval));
                }
            }
        }

        Ok(size)
    }

    /// Collect the completed flow for `cid` and release its slot.
    ///
    /// User threads read the status stored by [`config`](Self::config);
    /// dispatcher threads probe the `wait` task without suspending
    /// (`Proto` if the flow has not completed yet).
    pub(crate) fn wait(&self, rt: &Runtime, kinds: &[FlowKind], cid: Word) -> Result<()> {
        let is_user = !rt.sched().is_dispatcher_thread();

        if is_user {
            let ti = rt.threads().slot_of_current()?;
            let mut pools = self.pools.lock();
            let slot = &mut pools.users[ti];
            if !slot.in_use || slot.cid != cid {
                return Err(Error::Inval);
            }
            match slot.kind {
                Some(k) if kinds.contains(&k) => {}
                _ => return Err(Error::Inval),
            }
            let ret = slot.last_return;
            slot.release();
            if ret < 0 {
                return Err(Error::from_code(ret).unwrap_or(Error::Inval));
            }
            return Ok(());
        }

        let wait = {
            let pools = self.pools.lock();
            let Some(slot) = pools.dispatchers.iter().find(|s| {
                s.in_use && s.cid == cid && s.kind.is_some_and(|k| kinds.contains(&k))
            }) else {
                return Err(Error::Inval);
            };
            slot.wait
        };

        let ret = rt.sched().try_wait(wait)?;
        self.release_by_tasks_in_dispatcher_pool(cid, kinds);
        if ret < 0 {
            return Err(Error::from_code(ret).unwrap_or(Error::Inval));
        }
        Ok(())
    }

    // ── Internal ──────────────────────────────────────────────

    /// Release whichever slot owns `config`.
    fn release_by_tasks(&self, config: TaskId) {
        let mut pools = self.pools.lock();
        for s in pools.users.iter_mut() {
            if s.config == config {
                s.release();
                return;
            }
        }
        for s in pools.dispatchers.iter_mut() {
            if s.config == config {
                s.release();
                return;
            }
        }
    }

    fn release_by_tasks_in_dispatcher_pool(&self, cid: Word, kinds: &[FlowKind]) {
        let mut pools = self.pools.lock();
        for s in pools.dispatchers.iter_mut() {
            if s.in_use && s.cid == cid && s.kind.is_some_and(|k| kinds.contains(&k)) {
                s.release();
                return;
            }
        }
    }
}

// ── Flow task bodies ──────────────────────────────────────────

/// `config` body: issue the raw asynchronous operation.
///
/// Exit action by raw return:
/// * `>= 0`  — Success; the communicator id is published into `wait`.
/// * transient (`Busy`/`Again`/`Acces`/`NoMsg`/`TimedOut`) — Again.
/// * anything else — Error.
fn flow_config_body(run: &TaskRun<'_>) -> TaskExit {
    let kind = run.rt.flows().slot_kind(&run.args);
    let gate = run.rt.gate();
    let (cid, buf, size) = (run.args[0], run.args[1], run.args[2]);

    let ret = match kind {
        FlowKind::MailboxRead => calls::mailbox_aread(gate, cid, buf, size),
        FlowKind::MailboxWrite => calls::mailbox_awrite(gate, cid, buf, size),
        FlowKind::PortalRead => calls::portal_aread(gate, cid, buf, size),
        FlowKind::PortalWrite => calls::portal_awrite(gate, cid, buf, size),
    };

    if ret >= 0 {
        return TaskExit::success(ret as i32).publish1(cid);
    }
    match Error::from_code(ret as i32) {
        Some(e) if e.is_transient() => TaskExit::again(),
        _ => TaskExit::error(ret as i32),
    }
}

/// `wait` body: probe completion of the configured operation.
///
/// Exit action by raw return:
/// * `0`   — Finish; the communication is done and the waiter releases.
/// * `> 0` — Continue; the delivered message targets another port, so
///   loop back into `config` through the Continue edge.
/// * `< 0` — Error.
fn flow_wait_body(run: &TaskRun<'_>) -> TaskExit {
    let kind = run.rt.flows().slot_kind(&run.args);
    let gate = run.rt.gate();
    let cid = run.args[0];

    let ret = if kind.is_mailbox() {
        calls::mailbox_wait(gate, cid)
    } else {
        calls::portal_wait(gate, cid)
    };

    if ret < 0 {
        TaskExit::error(ret as i32)
    } else if ret == 0 {
        TaskExit::finish(0)
    } else {
        TaskExit::cont(ret as i32)
    }
}

/// Kind sets used by the user-API wait entry points.
pub(crate) const MAILBOX_KINDS: &[FlowKind] = &[FlowKind::MailboxRead, FlowKind::MailboxWrite];
pub(crate) const PORTAL_KINDS: &[FlowKind] = &[FlowKind::PortalRead, FlowKind::PortalWrite];

//! In-process NoC fabric.
//!
//! Host-side stand-in for the microkernel and the on-chip network.
//! Several runtimes attach to one `SimFabric`, each through a
//! [`SimNode`] gate carrying its node id; mailbox frames, portal pieces
//! and sync signals then move through shared in-memory tables.
//!
//! The fabric reproduces the transport's error surface where it
//! matters: a write towards a not-yet-created mailbox or a
//! not-yet-allowed portal is refused with a transient code the flow
//! engine retries on, a busy channel reports `EBUSY`, and `*_wait`
//! suspends the caller the way the kernel's completion probe does.
//!
//! Nothing here is part of the runtime proper — on hardware the whole
//! module is replaced by the supervisor-call gate.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::config::MAILBOX_MESSAGE_SIZE;
use crate::error::Error;
use crate::sys::calls::{
    self, IOCTL_GET_LATENCY, IOCTL_GET_VOLUME, IOCTL_SET_REMOTE, SyncType,
};
use crate::sys::gate::{KernelGate, Word};
use crate::sys::nr;

/// Frames one input mailbox queues before the reader drains them.
const MAILBOX_QUEUE_DEPTH: usize = 8;

/// Fixed per-transfer latency floor, in fabric cycles.
const LATENCY_BASE: u64 = 100;

// ── Fabric state ──────────────────────────────────────────────

struct Frame {
    data: [u8; MAILBOX_MESSAGE_SIZE],
    len: usize,
    src_node: i32,
    src_port: i32,
}

struct MailboxIn {
    node: i32,
    port: i32,
    queue: VecDeque<Frame>,
    /// Read posted by `aread`, completed by `wait`.
    pending: Option<(Word, usize)>,
    /// `SET_REMOTE` filter.
    allowed: Option<(i32, i32)>,
    volume: u64,
    latency: u64,
}

struct MailboxOut {
    node: i32,
    remote: i32,
    remote_port: i32,
    src_port: i32,
    volume: u64,
    latency: u64,
}

struct PortalIn {
    node: i32,
    port: i32,
    /// Writer `(node, port)` granted by `allow`; consumed per piece.
    allow: Option<(i32, i32)>,
    pending: Option<(Word, usize)>,
    /// Bytes landed by the last transfer, not yet collected by `wait`.
    done: Option<usize>,
    volume: u64,
    latency: u64,
}

struct PortalOut {
    node: i32,
    remote: i32,
    remote_port: i32,
    src_port: i32,
    volume: u64,
    latency: u64,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SyncRole {
    /// The waiting side (`sync_create`).
    Creator,
    /// The signalling side (`sync_open`).
    Opener,
}

struct SyncPeer {
    node: i32,
    point: usize,
    role: SyncRole,
    /// Last one-to-all epoch this peer has observed.
    seen_epoch: u64,
}

struct SyncPoint {
    nodes: Vec<i32>,
    kind: SyncType,
    /// All-to-one: signals not yet consumed by the leader.
    count: usize,
    /// One-to-all: generation counter bumped per leader signal.
    epoch: u64,
}

enum Endpoint {
    MailboxIn(MailboxIn),
    MailboxOut(MailboxOut),
    PortalIn(PortalIn),
    PortalOut(PortalOut),
    Sync(SyncPeer),
}

struct FabricState {
    endpoints: Vec<Option<Endpoint>>,
    points: Vec<SyncPoint>,
}

/// Shared in-process fabric.
pub struct SimFabric {
    state: Mutex<FabricState>,
    cv: Condvar,
}

impl SimFabric {
    pub fn new() -> Arc<Self> {
        log::info!("sim: fabric up");
        Arc::new(Self {
            state: Mutex::new(FabricState {
                endpoints: Vec::new(),
                points: Vec::new(),
            }),
            cv: Condvar::new(),
        })
    }

    /// Attach a node to the fabric and get its kernel-call gate.
    pub fn node(self: &Arc<Self>, node: i32) -> Arc<SimNode> {
        Arc::new(SimNode {
            fabric: Arc::clone(self),
            node,
        })
    }

    fn lock(&self) -> MutexGuard<'_, FabricState> {
        self.state.lock().expect("sim: fabric lock poisoned")
    }

    fn alloc(&self, st: &mut FabricState, ep: Endpoint) -> isize {
        st.endpoints.push(Some(ep));
        (st.endpoints.len() - 1) as isize
    }

    // ── Mailbox ───────────────────────────────────────────────

    fn mailbox_create(&self, node: i32, local: i32, port: i32) -> isize {
        if local != node {
            return Error::Inval.code() as isize;
        }
        let mut st = self.lock();
        let taken = st.endpoints.iter().flatten().any(|e| {
            matches!(e, Endpoint::MailboxIn(m) if m.node == node && m.port == port)
        });
        if taken {
            return Error::Busy.code() as isize;
        }
        self.alloc(
            &mut st,
            Endpoint::MailboxIn(MailboxIn {
                node,
                port,
                queue: VecDeque::new(),
                pending: None,
                allowed: None,
                volume: 0,
                latency: 0,
            }),
        )
    }

    fn mailbox_open(&self, node: i32, remote: i32, remote_port: i32) -> isize {
        let mut st = self.lock();
        self.alloc(
            &mut st,
            Endpoint::MailboxOut(MailboxOut {
                node,
                remote,
                remote_port,
                // An output is addressed by the port it targets; that
                // pair is what SET_REMOTE filters match against.
                src_port: remote_port,
                volume: 0,
                latency: 0,
            }),
        )
    }

    fn mailbox_unlink(&self, node: i32, id: Word) -> isize {
        let mut st = self.lock();
        match st.endpoints.get_mut(id) {
            Some(slot @ Some(Endpoint::MailboxIn(_))) => {
                if let Some(Endpoint::MailboxIn(m)) = slot {
                    if m.node != node {
                        return Error::Badf.code() as isize;
                    }
                }
                *slot = None;
                0
            }
            _ => Error::Badf.code() as isize,
        }
    }

    fn mailbox_close(&self, node: i32, id: Word) -> isize {
        let mut st = self.lock();
        match st.endpoints.get_mut(id) {
            Some(slot @ Some(Endpoint::MailboxOut(_))) => {
                if let Some(Endpoint::MailboxOut(m)) = slot {
                    if m.node != node {
                        return Error::Badf.code() as isize;
                    }
                }
                *slot = None;
                0
            }
            _ => Error::Badf.code() as isize,
        }
    }

    fn mailbox_aread(&self, node: i32, id: Word, buf: Word, size: Word) -> isize {
        let mut st = self.lock();
        let Some(Some(Endpoint::MailboxIn(m))) = st.endpoints.get_mut(id) else {
            return Error::Badf.code() as isize;
        };
        if m.node != node {
            return Error::Badf.code() as isize;
        }
        if m.pending.is_some() {
            return Error::Busy.code() as isize; // Channel already configured.
        }
        m.pending = Some((buf, size));
        size as isize
    }

    fn mailbox_awrite(&self, node: i32, id: Word, buf: Word, size: Word) -> isize {
        let mut st = self.lock();

        let (remote, remote_port, src_port) = {
            let Some(Some(Endpoint::MailboxOut(o))) = st.endpoints.get(id) else {
                return Error::Badf.code() as isize;
            };
            if o.node != node {
                return Error::Badf.code() as isize;
            }
            (o.remote, o.remote_port, o.src_port)
        };

        let Some(target) = st.endpoints.iter().position(|e| {
            matches!(e, Some(Endpoint::MailboxIn(m)) if m.node == remote && m.port == remote_port)
        }) else {
            // Receiver not up yet: transient, the flow retries.
            return Error::Acces.code() as isize;
        };

        let Some(Some(Endpoint::MailboxIn(m))) = st.endpoints.get_mut(target) else {
            return Error::Acces.code() as isize;
        };
        if m.queue.len() >= MAILBOX_QUEUE_DEPTH {
            return Error::Busy.code() as isize;
        }

        let mut frame = Frame {
            data: [0; MAILBOX_MESSAGE_SIZE],
            len: size.min(MAILBOX_MESSAGE_SIZE),
            src_node: node,
            src_port,
        };
        // SAFETY: `buf` is the sender's live buffer, handed over by the
        // flow for exactly the duration of this call; the typed wrapper
        // guarantees `size` bytes are readable.
        unsafe {
            core::ptr::copy_nonoverlapping(buf as *const u8, frame.data.as_mut_ptr(), frame.len);
        }
        m.queue.push_back(frame);

        // Writer-side accounting completes with the DMA hand-off.
        if let Some(Some(Endpoint::MailboxOut(o))) = st.endpoints.get_mut(id) {
            o.volume += size as u64;
            o.latency += LATENCY_BASE + size as u64;
        }

        self.cv.notify_all();
        size as isize
    }

    fn mailbox_wait(&self, node: i32, id: Word) -> isize {
        let mut st = self.lock();
        loop {
            let Some(Some(ep)) = st.endpoints.get_mut(id) else {
                return Error::Badf.code() as isize;
            };
            match ep {
                // Writes complete at configuration time.
                Endpoint::MailboxOut(_) => return 0,
                Endpoint::MailboxIn(m) => {
                    if m.node != node {
                        return Error::Badf.code() as isize;
                    }
                    let Some((buf, cap)) = m.pending else {
                        return Error::Inval.code() as isize;
                    };

                    if let Some(frame) = m.queue.pop_front() {
                        if let Some((an, ap)) = m.allowed {
                            if (frame.src_node, frame.src_port) != (an, ap) {
                                // Delivered for another sender: hand it
                                // back and ask for a reconfigure.
                                m.queue.push_back(frame);
                                m.pending = None;
                                return 1;
                            }
                            m.allowed = None;
                        }

                        let len = frame.len.min(cap);
                        // SAFETY: `buf` is the reader's buffer, exclusively
                        // owned by this flow until the wait completes; `cap`
                        // bytes are writable behind it.
                        unsafe {
                            core::ptr::copy_nonoverlapping(
                                frame.data.as_ptr(),
                                buf as *mut u8,
                                len,
                            );
                        }
                        m.pending = None;
                        m.volume += len as u64;
                        m.latency += LATENCY_BASE + len as u64;
                        return 0;
                    }
                }
                _ => return Error::Badf.code() as isize,
            }
            st = self.cv.wait(st).expect("sim: fabric lock poisoned");
        }
    }

    fn mailbox_ioctl(&self, node: i32, id: Word, request: Word, arg: Word) -> isize {
        let mut st = self.lock();
        let Some(Some(ep)) = st.endpoints.get_mut(id) else {
            return Error::Badf.code() as isize;
        };
        match ep {
            Endpoint::MailboxIn(m) => {
                if m.node != node {
                    return Error::Badf.code() as isize;
                }
                match request {
                    IOCTL_GET_VOLUME => m.volume as isize,
                    IOCTL_GET_LATENCY => m.latency as isize,
                    IOCTL_SET_REMOTE => {
                        let (remote, port) = calls::unpack_remote(arg);
                        m.allowed = Some((remote, port));
                        0
                    }
                    _ => Error::NotSup.code() as isize,
                }
            }
            Endpoint::MailboxOut(o) => {
                if o.node != node {
                    return Error::Badf.code() as isize;
                }
                match request {
                    IOCTL_GET_VOLUME => o.volume as isize,
                    IOCTL_GET_LATENCY => o.latency as isize,
                    _ => Error::NotSup.code() as isize,
                }
            }
            _ => Error::Badf.code() as isize,
        }
    }

    // ── Portal ────────────────────────────────────────────────

    fn portal_create(&self, node: i32, local: i32, port: i32) -> isize {
        if local != node {
            return Error::Inval.code() as isize;
        }
        let mut st = self.lock();
        let taken = st.endpoints.iter().flatten().any(|e| {
            matches!(e, Endpoint::PortalIn(p) if p.node == node && p.port == port)
        });
        if taken {
            return Error::Busy.code() as isize;
        }
        self.alloc(
            &mut st,
            Endpoint::PortalIn(PortalIn {
                node,
                port,
                allow: None,
                pending: None,
                done: None,
                volume: 0,
                latency: 0,
            }),
        )
    }

    fn portal_allow(&self, node: i32, id: Word, remote: i32, remote_port: i32) -> isize {
        let mut st = self.lock();
        let Some(Some(Endpoint::PortalIn(p))) = st.endpoints.get_mut(id) else {
            return Error::Badf.code() as isize;
        };
        if p.node != node {
            return Error::Badf.code() as isize;
        }
        p.allow = Some((remote, remote_port));
        self.cv.notify_all();
        0
    }

    fn portal_open(&self, node: i32, local: i32, remote: i32, remote_port: i32) -> isize {
        if local != node {
            return Error::Inval.code() as isize;
        }
        let mut st = self.lock();
        self.alloc(
            &mut st,
            Endpoint::PortalOut(PortalOut {
                node,
                remote,
                remote_port,
                // Outputs are addressed by the port they target, so an
                // allow names `(sender node, shared port constant)`.
                src_port: remote_port,
                volume: 0,
                latency: 0,
            }),
        )
    }

    fn portal_unlink(&self, node: i32, id: Word) -> isize {
        let mut st = self.lock();
        match st.endpoints.get_mut(id) {
            Some(slot @ Some(Endpoint::PortalIn(_))) => {
                if let Some(Endpoint::PortalIn(p)) = slot {
                    if p.node != node {
                        return Error::Badf.code() as isize;
                    }
                }
                *slot = None;
                0
            }
            _ => Error::Badf.code() as isize,
        }
    }

    fn portal_close(&self, node: i32, id: Word) -> isize {
        let mut st = self.lock();
        match st.endpoints.get_mut(id) {
            Some(slot @ Some(Endpoint::PortalOut(_))) => {
                if let Some(Endpoint::PortalOut(p)) = slot {
                    if p.node != node {
                        return Error::Badf.code() as isize;
                    }
                }
                *slot = None;
                0
            }
            _ => Error::Badf.code() as isize,
        }
    }

    fn portal_aread(&self, node: i32, id: Word, buf: Word, size: Word) -> isize {
        let mut st = self.lock();
        let Some(Some(Endpoint::PortalIn(p))) = st.endpoints.get_mut(id) else {
            return Error::Badf.code() as isize;
        };
        if p.node != node {
            return Error::Badf.code() as isize;
        }
        if p.pending.is_some() || p.done.is_some() {
            return Error::Busy.code() as isize;
        }
        p.pending = Some((buf, size));
        self.cv.notify_all();
        size as isize
    }

    fn portal_awrite(&self, node: i32, id: Word, buf: Word, size: Word) -> isize {
        let mut st = self.lock();

        let (remote, remote_port, src_port) = {
            let Some(Some(Endpoint::PortalOut(o))) = st.endpoints.get(id) else {
                return Error::Badf.code() as isize;
            };
            if o.node != node {
                return Error::Badf.code() as isize;
            }
            (o.remote, o.remote_port, o.src_port)
        };

        let Some(target) = st.endpoints.iter().position(|e| {
            matches!(e, Some(Endpoint::PortalIn(p)) if p.node == remote && p.port == remote_port)
        }) else {
            return Error::Acces.code() as isize;
        };

        let Some(Some(Endpoint::PortalIn(p))) = st.endpoints.get_mut(target) else {
            return Error::Acces.code() as isize;
        };
        // The transfer needs an access grant naming this writer...
        if p.allow != Some((node, src_port)) {
            return Error::Acces.code() as isize;
        }
        // ...and a posted read to land in.
        let Some((dst, cap)) = p.pending else {
            return Error::Busy.code() as isize;
        };

        let len = (size as usize).min(cap);
        // SAFETY: `buf` is the writer's live buffer for the duration of
        // this call; `dst` is the reader's posted buffer, exclusively
        // owned by its flow until the wait completes.
        unsafe {
            core::ptr::copy_nonoverlapping(buf as *const u8, dst as *mut u8, len);
        }
        p.pending = None;
        p.done = Some(len);
        p.allow = None;
        p.volume += len as u64;
        p.latency += LATENCY_BASE + len as u64;

        if let Some(Some(Endpoint::PortalOut(o))) = st.endpoints.get_mut(id) {
            o.volume += len as u64;
            o.latency += LATENCY_BASE + len as u64;
        }

        self.cv.notify_all();
        len as isize
    }

    fn portal_wait(&self, node: i32, id: Word) -> isize {
        let mut st = self.lock();
        loop {
            let Some(Some(ep)) = st.endpoints.get_mut(id) else {
                return Error::Badf.code() as isize;
            };
            match ep {
                // Writes complete at the awrite hand-off.
                Endpoint::PortalOut(_) => return 0,
                Endpoint::PortalIn(p) => {
                    if p.node != node {
                        return Error::Badf.code() as isize;
                    }
                    if p.done.take().is_some() {
                        return 0;
                    }
                    if p.pending.is_none() {
                        return Error::Inval.code() as isize;
                    }
                }
                _ => return Error::Badf.code() as isize,
            }
            st = self.cv.wait(st).expect("sim: fabric lock poisoned");
        }
    }

    fn portal_ioctl(&self, node: i32, id: Word, request: Word) -> isize {
        let st = self.lock();
        let Some(Some(ep)) = st.endpoints.get(id) else {
            return Error::Badf.code() as isize;
        };
        let (owner, volume, latency) = match ep {
            Endpoint::PortalIn(p) => (p.node, p.volume, p.latency),
            Endpoint::PortalOut(p) => (p.node, p.volume, p.latency),
            _ => return Error::Badf.code() as isize,
        };
        if owner != node {
            return Error::Badf.code() as isize;
        }
        match request {
            IOCTL_GET_VOLUME => volume as isize,
            IOCTL_GET_LATENCY => latency as isize,
            _ => Error::NotSup.code() as isize,
        }
    }

    // ── Sync points ───────────────────────────────────────────

    fn point_for(&self, st: &mut FabricState, nodes: &[i32], kind: SyncType) -> usize {
        if let Some(i) = st
            .points
            .iter()
            .position(|p| p.kind == kind && p.nodes == nodes)
        {
            return i;
        }
        st.points.push(SyncPoint {
            nodes: nodes.to_vec(),
            kind,
            count: 0,
            epoch: 0,
        });
        st.points.len() - 1
    }

    fn sync_attach(&self, node: i32, nodes: &[i32], kind: SyncType, role: SyncRole) -> isize {
        if nodes.len() < 2 || !nodes.contains(&node) {
            return Error::Inval.code() as isize;
        }

        // The waiting side of all-to-one is the leader; of one-to-all,
        // the followers. The signalling side is the mirror image.
        let is_leader = node == nodes[0];
        let waits = role == SyncRole::Creator;
        let leader_side = match kind {
            SyncType::AllToOne => waits,
            SyncType::OneToAll => !waits,
        };
        if is_leader != leader_side {
            return Error::Inval.code() as isize;
        }

        let mut st = self.lock();
        let point = self.point_for(&mut st, nodes, kind);
        let seen = st.points[point].epoch;
        self.alloc(
            &mut st,
            Endpoint::Sync(SyncPeer {
                node,
                point,
                role,
                seen_epoch: seen,
            }),
        )
    }

    fn sync_detach(&self, node: i32, id: Word, role: SyncRole) -> isize {
        let mut st = self.lock();
        match st.endpoints.get_mut(id) {
            Some(slot @ Some(Endpoint::Sync(_))) => {
                if let Some(Endpoint::Sync(s)) = slot {
                    if s.node != node || s.role != role {
                        return Error::Badf.code() as isize;
                    }
                }
                *slot = None;
                0
            }
            _ => Error::Badf.code() as isize,
        }
    }

    fn sync_wait(&self, node: i32, id: Word) -> isize {
        let mut st = self.lock();
        loop {
            let (point, kind, seen) = {
                let Some(Some(Endpoint::Sync(s))) = st.endpoints.get(id) else {
                    return Error::Badf.code() as isize;
                };
                if s.node != node || s.role != SyncRole::Creator {
                    return Error::Perm.code() as isize;
                }
                (s.point, st.points[s.point].kind, s.seen_epoch)
            };

            match kind {
                SyncType::AllToOne => {
                    let needed = st.points[point].nodes.len() - 1;
                    if st.points[point].count >= needed {
                        st.points[point].count -= needed;
                        return 0;
                    }
                }
                SyncType::OneToAll => {
                    if st.points[point].epoch > seen {
                        if let Some(Some(Endpoint::Sync(s))) = st.endpoints.get_mut(id) {
                            s.seen_epoch += 1;
                        }
                        return 0;
                    }
                }
            }
            st = self.cv.wait(st).expect("sim: fabric lock poisoned");
        }
    }

    fn sync_signal(&self, node: i32, id: Word) -> isize {
        let mut st = self.lock();
        let point = {
            let Some(Some(Endpoint::Sync(s))) = st.endpoints.get(id) else {
                return Error::Badf.code() as isize;
            };
            if s.node != node || s.role != SyncRole::Opener {
                return Error::Perm.code() as isize;
            }
            s.point
        };

        match st.points[point].kind {
            SyncType::AllToOne => st.points[point].count += 1,
            SyncType::OneToAll => st.points[point].epoch += 1,
        }
        self.cv.notify_all();
        0
    }
}

// ── Per-node gate ─────────────────────────────────────────────

/// A node's view of the fabric; implements the kernel-call gate.
pub struct SimNode {
    fabric: Arc<SimFabric>,
    node: i32,
}

impl SimNode {
    pub fn node_num(&self) -> i32 {
        self.node
    }

    fn sync_kind(raw: Word) -> Option<SyncType> {
        match raw {
            0 => Some(SyncType::AllToOne),
            1 => Some(SyncType::OneToAll),
            _ => None,
        }
    }

    /// Decode the node-list argument of a sync call.
    ///
    /// # Safety
    ///
    /// Callers reach this only through the typed wrappers, which pass a
    /// live `&[i32]` and block until the call returns.
    unsafe fn node_list<'a>(ptr: Word, len: Word) -> &'a [i32] {
        unsafe { core::slice::from_raw_parts(ptr as *const i32, len) }
    }
}

impl KernelGate for SimNode {
    fn call0(&self, nr: usize) -> isize {
        match nr {
            nr::NODE_GET_NUM => self.node as isize,
            nr::DCACHE_INVALIDATE => 0,
            _ => Error::NotSup.code() as isize,
        }
    }

    fn call1(&self, nr: usize, a: Word) -> isize {
        let f = &self.fabric;
        match nr {
            nr::MAILBOX_UNLINK => f.mailbox_unlink(self.node, a),
            nr::MAILBOX_CLOSE => f.mailbox_close(self.node, a),
            nr::MAILBOX_WAIT => f.mailbox_wait(self.node, a),
            nr::PORTAL_UNLINK => f.portal_unlink(self.node, a),
            nr::PORTAL_CLOSE => f.portal_close(self.node, a),
            nr::PORTAL_WAIT => f.portal_wait(self.node, a),
            nr::SYNC_UNLINK => f.sync_detach(self.node, a, SyncRole::Creator),
            nr::SYNC_CLOSE => f.sync_detach(self.node, a, SyncRole::Opener),
            nr::SYNC_WAIT => f.sync_wait(self.node, a),
            nr::SYNC_SIGNAL => f.sync_signal(self.node, a),
            _ => Error::NotSup.code() as isize,
        }
    }

    fn call2(&self, nr: usize, a: Word, b: Word) -> isize {
        let f = &self.fabric;
        match nr {
            nr::MAILBOX_CREATE => f.mailbox_create(self.node, a as i32, b as i32),
            nr::MAILBOX_OPEN => f.mailbox_open(self.node, a as i32, b as i32),
            nr::PORTAL_CREATE => f.portal_create(self.node, a as i32, b as i32),
            _ => Error::NotSup.code() as isize,
        }
    }

    fn call3(&self, nr: usize, a: Word, b: Word, c: Word) -> isize {
        let f = &self.fabric;
        match nr {
            nr::MAILBOX_AREAD => f.mailbox_aread(self.node, a, b, c),
            nr::MAILBOX_AWRITE => f.mailbox_awrite(self.node, a, b, c),
            nr::MAILBOX_IOCTL => f.mailbox_ioctl(self.node, a, b, c),
            nr::PORTAL_ALLOW => f.portal_allow(self.node, a, b as i32, c as i32),
            nr::PORTAL_OPEN => f.portal_open(self.node, a as i32, b as i32, c as i32),
            nr::PORTAL_AREAD => f.portal_aread(self.node, a, b, c),
            nr::PORTAL_AWRITE => f.portal_awrite(self.node, a, b, c),
            nr::PORTAL_IOCTL => f.portal_ioctl(self.node, a, b),
            nr::SYNC_CREATE | nr::SYNC_OPEN => {
                let Some(kind) = Self::sync_kind(c) else {
                    return Error::Inval.code() as isize;
                };
                // SAFETY: `a`/`b` come from the typed sync wrappers,
                // which hold the node slice across the call.
                let nodes = unsafe { Self::node_list(a, b) };
                let role = if nr == nr::SYNC_CREATE {
                    SyncRole::Creator
                } else {
                    SyncRole::Opener
                };
                f.sync_attach(self.node, nodes, kind, role)
            }
            _ => Error::NotSup.code() as isize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_frame_lands() {
        let fabric = SimFabric::new();
        let gate = fabric.node(0);

        let inbox = gate.call2(nr::MAILBOX_CREATE, 0, 3);
        assert!(inbox >= 0);
        let out = gate.call2(nr::MAILBOX_OPEN, 0, 3);
        assert!(out >= 0);

        let tx = [0x5Au8; 16];
        let mut rx = [0u8; 16];
        assert_eq!(
            gate.call3(nr::MAILBOX_AWRITE, out as Word, tx.as_ptr() as Word, 16),
            16
        );
        assert_eq!(
            gate.call3(nr::MAILBOX_AREAD, inbox as Word, rx.as_mut_ptr() as Word, 16),
            16
        );
        assert_eq!(gate.call1(nr::MAILBOX_WAIT, inbox as Word), 0);
        assert_eq!(rx, tx);
    }

    #[test]
    fn awrite_without_receiver_is_transient() {
        let fabric = SimFabric::new();
        let gate = fabric.node(0);

        let out = gate.call2(nr::MAILBOX_OPEN, 7, 0);
        let buf = [1u8; 8];
        let ret = gate.call3(nr::MAILBOX_AWRITE, out as Word, buf.as_ptr() as Word, 8);
        assert_eq!(ret, Error::Acces.code() as isize);
    }

    #[test]
    fn double_unlink_is_badf() {
        let fabric = SimFabric::new();
        let gate = fabric.node(0);

        let inbox = gate.call2(nr::MAILBOX_CREATE, 0, 0);
        assert_eq!(gate.call1(nr::MAILBOX_UNLINK, inbox as Word), 0);
        assert_eq!(
            gate.call1(nr::MAILBOX_UNLINK, inbox as Word),
            Error::Badf.code() as isize
        );
    }

    #[test]
    fn unlink_of_opened_id_is_badf() {
        let fabric = SimFabric::new();
        let gate = fabric.node(0);

        let out = gate.call2(nr::MAILBOX_OPEN, 1, 0);
        assert_eq!(
            gate.call1(nr::MAILBOX_UNLINK, out as Word),
            Error::Badf.code() as isize
        );
    }

    #[test]
    fn portal_write_needs_allow() {
        let fabric = SimFabric::new();
        let rx_gate = fabric.node(0);
        let tx_gate = fabric.node(1);

        let pin = rx_gate.call2(nr::PORTAL_CREATE, 0, 2);
        let pout = tx_gate.call3(nr::PORTAL_OPEN, 1, 0, 2);
        assert!(pin >= 0 && pout >= 0);

        let data = [7u8; 64];
        let ret = tx_gate.call3(nr::PORTAL_AWRITE, pout as Word, data.as_ptr() as Word, 64);
        assert_eq!(ret, Error::Acces.code() as isize);
    }
}

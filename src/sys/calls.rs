//! Typed wrappers over the kernel-call gate.
//!
//! Control-plane calls (create/open/unlink/close/ioctl, sync) convert the
//! raw word into a `Result` here. Data-plane calls (`aread`, `awrite`,
//! `wait`) stay raw: the flow engine classifies their returns itself,
//! because a negative word may be a transient condition to retry rather
//! than an error to surface.

use super::gate::{KernelGate, Word};
use super::nr;
use crate::error::{Result, word_to_result};

// ── Gate-level ioctl requests ─────────────────────────────────
//
// Counter requests never reach the gate; they are served from the
// user-side tables. Only the hardware-measured parameters go down.

/// Bytes moved through the communicator since creation.
pub const IOCTL_GET_VOLUME: Word = 1;
/// Accumulated transfer latency, in NoC cycles.
pub const IOCTL_GET_LATENCY: Word = 2;
/// Restrict an input mailbox to one remote `(node, port)` sender.
pub const IOCTL_SET_REMOTE: Word = 3;

/// Pack a `(remote, port)` pair into the single ioctl argument word.
pub const fn pack_remote(remote: i32, port: i32) -> Word {
    (((remote as u32 as Word) & 0xffff) << 16) | ((port as u32 as Word) & 0xffff)
}

/// Unpack the argument word of [`IOCTL_SET_REMOTE`].
pub const fn unpack_remote(arg: Word) -> (i32, i32) {
    (((arg >> 16) & 0xffff) as i32, (arg & 0xffff) as i32)
}

// ── Node identity ─────────────────────────────────────────────

/// Logic id of the local NoC node.
pub fn node_get_num(gate: &dyn KernelGate) -> i32 {
    gate.call0(nr::NODE_GET_NUM) as i32
}

/// Invalidate the data cache. Brackets every gate-level ioctl so the
/// measurement registers are read coherently.
pub fn dcache_invalidate(gate: &dyn KernelGate) {
    let _ = gate.call0(nr::DCACHE_INVALIDATE);
}

// ── Mailbox ───────────────────────────────────────────────────

pub fn mailbox_create(gate: &dyn KernelGate, local: i32, port: i32) -> Result<i32> {
    word_to_result(gate.call2(nr::MAILBOX_CREATE, local as Word, port as Word)).map(|v| v as i32)
}

pub fn mailbox_open(gate: &dyn KernelGate, remote: i32, remote_port: i32) -> Result<i32> {
    word_to_result(gate.call2(nr::MAILBOX_OPEN, remote as Word, remote_port as Word))
        .map(|v| v as i32)
}

pub fn mailbox_unlink(gate: &dyn KernelGate, mbxid: i32) -> Result<()> {
    word_to_result(gate.call1(nr::MAILBOX_UNLINK, mbxid as Word)).map(|_| ())
}

pub fn mailbox_close(gate: &dyn KernelGate, mbxid: i32) -> Result<()> {
    word_to_result(gate.call1(nr::MAILBOX_CLOSE, mbxid as Word)).map(|_| ())
}

/// Raw asynchronous read configuration. Negative returns are classified
/// by the caller.
pub fn mailbox_aread(gate: &dyn KernelGate, mbxid: Word, buf: Word, size: Word) -> isize {
    gate.call3(nr::MAILBOX_AREAD, mbxid, buf, size)
}

/// Raw asynchronous write configuration.
pub fn mailbox_awrite(gate: &dyn KernelGate, mbxid: Word, buf: Word, size: Word) -> isize {
    gate.call3(nr::MAILBOX_AWRITE, mbxid, buf, size)
}

/// Raw completion probe: `0` done, positive when the delivered message
/// targets another port (re-configure and retry), negative on error.
pub fn mailbox_wait(gate: &dyn KernelGate, mbxid: Word) -> isize {
    gate.call1(nr::MAILBOX_WAIT, mbxid)
}

/// Gate-level mailbox ioctl with cache bracketing.
pub fn mailbox_ioctl(gate: &dyn KernelGate, mbxid: i32, request: Word, arg: Word) -> Result<isize> {
    dcache_invalidate(gate);
    let ret = word_to_result(gate.call3(nr::MAILBOX_IOCTL, mbxid as Word, request, arg));
    dcache_invalidate(gate);
    ret
}

// ── Portal ────────────────────────────────────────────────────

pub fn portal_create(gate: &dyn KernelGate, local: i32, local_port: i32) -> Result<i32> {
    word_to_result(gate.call2(nr::PORTAL_CREATE, local as Word, local_port as Word))
        .map(|v| v as i32)
}

pub fn portal_allow(gate: &dyn KernelGate, portalid: i32, remote: i32, remote_port: i32) -> Result<()> {
    word_to_result(gate.call3(
        nr::PORTAL_ALLOW,
        portalid as Word,
        remote as Word,
        remote_port as Word,
    ))
    .map(|_| ())
}

pub fn portal_open(gate: &dyn KernelGate, local: i32, remote: i32, remote_port: i32) -> Result<i32> {
    word_to_result(gate.call3(
        nr::PORTAL_OPEN,
        local as Word,
        remote as Word,
        remote_port as Word,
    ))
    .map(|v| v as i32)
}

pub fn portal_unlink(gate: &dyn KernelGate, portalid: i32) -> Result<()> {
    word_to_result(gate.call1(nr::PORTAL_UNLINK, portalid as Word)).map(|_| ())
}

pub fn portal_close(gate: &dyn KernelGate, portalid: i32) -> Result<()> {
    word_to_result(gate.call1(nr::PORTAL_CLOSE, portalid as Word)).map(|_| ())
}

/// Raw asynchronous portal read configuration.
pub fn portal_aread(gate: &dyn KernelGate, portalid: Word, buf: Word, size: Word) -> isize {
    gate.call3(nr::PORTAL_AREAD, portalid, buf, size)
}

/// Raw asynchronous portal write configuration.
pub fn portal_awrite(gate: &dyn KernelGate, portalid: Word, buf: Word, size: Word) -> isize {
    gate.call3(nr::PORTAL_AWRITE, portalid, buf, size)
}

/// Raw portal completion probe; same protocol as [`mailbox_wait`].
pub fn portal_wait(gate: &dyn KernelGate, portalid: Word) -> isize {
    gate.call1(nr::PORTAL_WAIT, portalid)
}

/// Gate-level portal ioctl with cache bracketing.
pub fn portal_ioctl(gate: &dyn KernelGate, portalid: i32, request: Word, arg: Word) -> Result<isize> {
    dcache_invalidate(gate);
    let ret = word_to_result(gate.call3(nr::PORTAL_IOCTL, portalid as Word, request, arg));
    dcache_invalidate(gate);
    ret
}

// ── Sync points ───────────────────────────────────────────────

/// Direction of a synchronization point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SyncType {
    /// Every follower signals; the leader waits for all of them.
    AllToOne = 0,
    /// The leader signals; every follower waits for it.
    OneToAll = 1,
}

pub fn sync_create(gate: &dyn KernelGate, nodes: &[i32], kind: SyncType) -> Result<i32> {
    word_to_result(gate.call3(
        nr::SYNC_CREATE,
        nodes.as_ptr() as Word,
        nodes.len(),
        kind as Word,
    ))
    .map(|v| v as i32)
}

pub fn sync_open(gate: &dyn KernelGate, nodes: &[i32], kind: SyncType) -> Result<i32> {
    word_to_result(gate.call3(
        nr::SYNC_OPEN,
        nodes.as_ptr() as Word,
        nodes.len(),
        kind as Word,
    ))
    .map(|v| v as i32)
}

pub fn sync_unlink(gate: &dyn KernelGate, syncid: i32) -> Result<()> {
    word_to_result(gate.call1(nr::SYNC_UNLINK, syncid as Word)).map(|_| ())
}

pub fn sync_close(gate: &dyn KernelGate, syncid: i32) -> Result<()> {
    word_to_result(gate.call1(nr::SYNC_CLOSE, syncid as Word)).map(|_| ())
}

pub fn sync_wait(gate: &dyn KernelGate, syncid: i32) -> Result<()> {
    word_to_result(gate.call1(nr::SYNC_WAIT, syncid as Word)).map(|_| ())
}

pub fn sync_signal(gate: &dyn KernelGate, syncid: i32) -> Result<()> {
    word_to_result(gate.call1(nr::SYNC_SIGNAL, syncid as Word)).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_packing_round_trip() {
        for (remote, port) in [(0, 0), (3, 15), (255, 7), (0xffff, 0xffff)] {
            let (r, p) = unpack_remote(pack_remote(remote, port));
            assert_eq!((r, p), (remote, port));
        }
    }
}

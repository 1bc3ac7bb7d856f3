//! Call numbers for the kernel-call gate.
//!
//! Numbering groups by subsystem with gaps for future calls, the same
//! way the supervisor-call table lays them out.

/// Raw call number.
pub type CallNr = usize;

// ── Node identity ─────────────────────────────────────────────
pub const NODE_GET_NUM: CallNr = 1;

// ── Cache maintenance ─────────────────────────────────────────
pub const DCACHE_INVALIDATE: CallNr = 5;

// ── Mailbox ───────────────────────────────────────────────────
pub const MAILBOX_CREATE: CallNr = 10;
pub const MAILBOX_OPEN: CallNr = 11;
pub const MAILBOX_UNLINK: CallNr = 12;
pub const MAILBOX_CLOSE: CallNr = 13;
pub const MAILBOX_AREAD: CallNr = 14;
pub const MAILBOX_AWRITE: CallNr = 15;
pub const MAILBOX_WAIT: CallNr = 16;
pub const MAILBOX_IOCTL: CallNr = 17;

// ── Portal ────────────────────────────────────────────────────
pub const PORTAL_CREATE: CallNr = 20;
pub const PORTAL_ALLOW: CallNr = 21;
pub const PORTAL_OPEN: CallNr = 22;
pub const PORTAL_UNLINK: CallNr = 23;
pub const PORTAL_CLOSE: CallNr = 24;
pub const PORTAL_AREAD: CallNr = 25;
pub const PORTAL_AWRITE: CallNr = 26;
pub const PORTAL_WAIT: CallNr = 27;
pub const PORTAL_IOCTL: CallNr = 28;

// ── Sync points ───────────────────────────────────────────────
pub const SYNC_CREATE: CallNr = 30;
pub const SYNC_OPEN: CallNr = 31;
pub const SYNC_UNLINK: CallNr = 32;
pub const SYNC_CLOSE: CallNr = 33;
pub const SYNC_WAIT: CallNr = 34;
pub const SYNC_SIGNAL: CallNr = 35;

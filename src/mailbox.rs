//! Mailbox user API.
//!
//! Mailboxes carry fixed-size control messages between NoC nodes. The
//! synchronous `read`/`write` entry points validate, drive one flow
//! through the engine, and advance the counters; the asynchronous
//! halves (`aread`/`awrite` + `wait`) expose the same flow split the
//! kernel does.

use crate::comm::CommIoctl;
use crate::config::{MAILBOX_MAX, MAILBOX_MESSAGE_SIZE, MAILBOX_PORT_NR};
use crate::error::{Error, Result};
use crate::flow::{FlowKind, MAILBOX_KINDS};
use crate::runtime::Runtime;
use crate::sys::Word;
use crate::sys::calls;

fn valid_mailbox_id(mbxid: i32) -> Result<()> {
    if mbxid < 0 || mbxid as usize >= MAILBOX_MAX {
        return Err(Error::Inval);
    }
    Ok(())
}

fn valid_mailbox_size(size: usize) -> Result<()> {
    if size == 0 || size > MAILBOX_MESSAGE_SIZE {
        return Err(Error::Inval);
    }
    Ok(())
}

impl Runtime {
    // ── Lifecycle ─────────────────────────────────────────────

    /// Create an input mailbox attached to `(local, port)`.
    pub fn mailbox_create(&self, local: i32, port: i32) -> Result<i32> {
        if !(0..MAILBOX_PORT_NR).contains(&port) {
            return Err(Error::Inval);
        }

        let id = calls::mailbox_create(self.gate(), local, port)?;
        self.mailboxes().note_create(id);
        Ok(id)
    }

    /// Open an output mailbox towards `(remote, remote_port)`.
    pub fn mailbox_open(&self, remote: i32, remote_port: i32) -> Result<i32> {
        if !(0..MAILBOX_PORT_NR).contains(&remote_port) {
            return Err(Error::Inval);
        }

        let id = calls::mailbox_open(self.gate(), remote, remote_port)?;
        self.mailboxes().note_open(id);
        Ok(id)
    }

    /// Release an input mailbox previously `create`d.
    pub fn mailbox_unlink(&self, mbxid: i32) -> Result<()> {
        valid_mailbox_id(mbxid)?;
        calls::mailbox_unlink(self.gate(), mbxid)?;
        self.mailboxes().note_unlink(mbxid);
        Ok(())
    }

    /// Release an output mailbox previously `open`ed.
    pub fn mailbox_close(&self, mbxid: i32) -> Result<()> {
        valid_mailbox_id(mbxid)?;
        calls::mailbox_close(self.gate(), mbxid)?;
        self.mailboxes().note_close(mbxid);
        Ok(())
    }

    // ── Data plane ────────────────────────────────────────────

    /// Configure an asynchronous read into `buf`.
    ///
    /// From a user thread this suspends until the message has landed;
    /// collect the status with [`mailbox_wait`](Self::mailbox_wait).
    pub fn mailbox_aread(&self, mbxid: i32, buf: &mut [u8]) -> Result<usize> {
        valid_mailbox_id(mbxid)?;
        valid_mailbox_size(buf.len())?;

        // Exclusive access to `buf` transfers to the flow here; the
        // borrow is held by the caller until the flow completes, and
        // the user path does not return before it does.
        self.flows().config(
            self,
            FlowKind::MailboxRead,
            mbxid as Word,
            buf.as_mut_ptr() as Word,
            buf.len(),
        )
    }

    /// Configure an asynchronous write of `buf`.
    pub fn mailbox_awrite(&self, mbxid: i32, buf: &[u8]) -> Result<usize> {
        valid_mailbox_id(mbxid)?;
        valid_mailbox_size(buf.len())?;

        self.flows().config(
            self,
            FlowKind::MailboxWrite,
            mbxid as Word,
            buf.as_ptr() as Word,
            buf.len(),
        )
    }

    /// Collect the outcome of the in-flight mailbox flow on `mbxid`.
    pub fn mailbox_wait(&self, mbxid: i32) -> Result<()> {
        valid_mailbox_id(mbxid)?;
        self.flows().wait(self, MAILBOX_KINDS, mbxid as Word)
    }

    /// Synchronous read: returns the byte count on success.
    pub fn mailbox_read(&self, mbxid: i32, buf: &mut [u8]) -> Result<usize> {
        let n = self.mailbox_aread(mbxid, buf)?;
        self.mailbox_wait(mbxid)?;
        self.mailboxes().note_read(mbxid);
        Ok(n)
    }

    /// Synchronous write: returns the byte count on success.
    pub fn mailbox_write(&self, mbxid: i32, buf: &[u8]) -> Result<usize> {
        let n = self.mailbox_awrite(mbxid, buf)?;
        self.mailbox_wait(mbxid)?;
        self.mailboxes().note_write(mbxid);
        Ok(n)
    }

    // ── Measurement and configuration ─────────────────────────

    /// Read a measurement or counter for `mbxid`.
    pub fn mailbox_ioctl(&self, mbxid: i32, request: CommIoctl) -> Result<u64> {
        valid_mailbox_id(mbxid)?;

        if let Some(v) = request.from_counters(&self.mailboxes().counters()) {
            return Ok(v);
        }

        let gate_req = match request {
            CommIoctl::GetVolume => calls::IOCTL_GET_VOLUME,
            CommIoctl::GetLatency => calls::IOCTL_GET_LATENCY,
            _ => return Err(Error::NotSup),
        };
        let v = calls::mailbox_ioctl(self.gate(), mbxid, gate_req, 0)?;
        Ok(v as u64)
    }

    /// Restrict the input mailbox `mbxid` to messages from
    /// `(remote, remote_port)`. The restriction persists until a
    /// successful read consumes it.
    pub fn mailbox_set_remote(&self, mbxid: i32, remote: i32, remote_port: i32) -> Result<()> {
        valid_mailbox_id(mbxid)?;
        if remote < 0 || !(0..MAILBOX_PORT_NR).contains(&remote_port) {
            return Err(Error::Inval);
        }

        calls::mailbox_ioctl(
            self.gate(),
            mbxid,
            calls::IOCTL_SET_REMOTE,
            calls::pack_remote(remote, remote_port),
        )?;
        self.mailboxes().record_allow(mbxid, remote, remote_port);
        Ok(())
    }
}

//! Portal user API.
//!
//! Portals move variable-size bulk data. A transfer larger than one
//! piece is chunked: the flow engine is driven once per piece and the
//! receiver's `allow` is re-issued between consecutive pieces, since a
//! piece consumes it.
//!
//! ```text
//!  write(3000B)            read(3000B), allow(remote) issued once
//!  ┌──────────┐            ┌──────────┐
//!  │ 1024     │──piece 0──▶│ 1024     │  allow consumed
//!  │ 1024     │──piece 1──▶│ 1024     │  re-allow, then aread
//!  │  952     │──piece 2──▶│  952     │  re-allow, then aread
//!  └──────────┘            └──────────┘
//! ```

use crate::config::{PORTAL_MAX, PORTAL_MAX_SIZE, PORTAL_MESSAGE_DATA_SIZE, PORTAL_PORT_NR};
use crate::error::{Error, Result};
use crate::flow::{FlowKind, PORTAL_KINDS};
use crate::comm::CommIoctl;
use crate::runtime::Runtime;
use crate::sys::Word;
use crate::sys::calls;

fn valid_portal_id(portalid: i32) -> Result<()> {
    if portalid < 0 || portalid as usize >= PORTAL_MAX {
        return Err(Error::Inval);
    }
    Ok(())
}

fn valid_piece_size(size: usize) -> Result<()> {
    if size == 0 || size > PORTAL_MESSAGE_DATA_SIZE {
        return Err(Error::Inval);
    }
    Ok(())
}

impl Runtime {
    // ── Lifecycle ─────────────────────────────────────────────

    /// Create an input portal attached to `(local, local_port)`.
    /// `local` must name the calling node.
    pub fn portal_create(&self, local: i32, local_port: i32) -> Result<i32> {
        if local != self.node() {
            return Err(Error::Inval);
        }
        if !(0..PORTAL_PORT_NR).contains(&local_port) {
            return Err(Error::Inval);
        }

        let id = calls::portal_create(self.gate(), local, local_port)?;
        self.portals().note_create(id);
        Ok(id)
    }

    /// Authorize the next read on `portalid` to accept traffic from
    /// `(remote, remote_port)`. `Busy` if an allow is already pending.
    pub fn portal_allow(&self, portalid: i32, remote: i32, remote_port: i32) -> Result<()> {
        valid_portal_id(portalid)?;

        self.portals().set_allow(portalid, remote, remote_port)?;
        if let Err(e) = calls::portal_allow(self.gate(), portalid, remote, remote_port) {
            self.portals().clear_allow(portalid);
            return Err(e);
        }
        Ok(())
    }

    /// Open an output portal from `local` towards `(remote, remote_port)`.
    /// `local` must name the calling node.
    pub fn portal_open(&self, local: i32, remote: i32, remote_port: i32) -> Result<i32> {
        if local != self.node() {
            return Err(Error::Inval);
        }

        let id = calls::portal_open(self.gate(), local, remote, remote_port)?;
        self.portals().note_open(id);
        Ok(id)
    }

    /// Release an input portal previously `create`d.
    pub fn portal_unlink(&self, portalid: i32) -> Result<()> {
        valid_portal_id(portalid)?;
        calls::portal_unlink(self.gate(), portalid)?;
        self.portals().note_unlink(portalid);
        Ok(())
    }

    /// Release an output portal previously `open`ed.
    pub fn portal_close(&self, portalid: i32) -> Result<()> {
        valid_portal_id(portalid)?;
        calls::portal_close(self.gate(), portalid)?;
        self.portals().note_close(portalid);
        Ok(())
    }

    // ── Data plane ────────────────────────────────────────────

    /// Configure an asynchronous read of one piece into `buf`.
    pub fn portal_aread(&self, portalid: i32, buf: &mut [u8]) -> Result<usize> {
        valid_portal_id(portalid)?;
        valid_piece_size(buf.len())?;

        self.flows().config(
            self,
            FlowKind::PortalRead,
            portalid as Word,
            buf.as_mut_ptr() as Word,
            buf.len(),
        )
    }

    /// Configure an asynchronous write of one piece from `buf`.
    pub fn portal_awrite(&self, portalid: i32, buf: &[u8]) -> Result<usize> {
        valid_portal_id(portalid)?;
        valid_piece_size(buf.len())?;

        self.flows().config(
            self,
            FlowKind::PortalWrite,
            portalid as Word,
            buf.as_ptr() as Word,
            buf.len(),
        )
    }

    /// Collect the outcome of the in-flight portal flow on `portalid`.
    pub fn portal_wait(&self, portalid: i32) -> Result<()> {
        valid_portal_id(portalid)?;
        self.flows().wait(self, PORTAL_KINDS, portalid as Word)
    }

    /// Synchronous bulk write: chunks `buf` and drives one flow per
    /// piece. Returns the total byte count.
    pub fn portal_write(&self, portalid: i32, buf: &[u8]) -> Result<usize> {
        valid_portal_id(portalid)?;
        if buf.is_empty() || buf.len() > PORTAL_MAX_SIZE {
            return Err(Error::Inval);
        }

        for piece in buf.chunks(PORTAL_MESSAGE_DATA_SIZE) {
            self.portal_awrite(portalid, piece)?;
            self.portal_wait(portalid)?;
        }

        self.portals().note_write(portalid);
        Ok(buf.len())
    }

    /// Synchronous bulk read: chunks `buf`, re-issuing the recorded
    /// allow before every piece after the first. A completed read
    /// consumes the allow record.
    pub fn portal_read(&self, portalid: i32, buf: &mut [u8]) -> Result<usize> {
        valid_portal_id(portalid)?;
        if buf.is_empty() || buf.len() > PORTAL_MAX_SIZE {
            return Err(Error::Inval);
        }

        let allow = self.portals().allow(portalid);
        let total = buf.len();

        for (t, piece) in buf.chunks_mut(PORTAL_MESSAGE_DATA_SIZE).enumerate() {
            // Consecutive pieces must be re-allowed; the first piece
            // rides on the allow the caller issued.
            if t != 0 {
                let Some((remote, port)) = allow else {
                    return Err(Error::Acces);
                };
                calls::portal_allow(self.gate(), portalid, remote, port)?;
                self.portals().record_allow(portalid, remote, port);
            }

            self.portal_aread(portalid, piece)?;
            self.portal_wait(portalid)?;
        }

        self.portals().clear_allow(portalid);
        self.portals().note_read(portalid);
        Ok(total)
    }

    // ── Measurement ───────────────────────────────────────────

    /// Read a measurement or counter for `portalid`.
    pub fn portal_ioctl(&self, portalid: i32, request: CommIoctl) -> Result<u64> {
        valid_portal_id(portalid)?;

        if let Some(v) = request.from_counters(&self.portals().counters()) {
            return Ok(v);
        }

        let gate_req = match request {
            CommIoctl::GetVolume => calls::IOCTL_GET_VOLUME,
            CommIoctl::GetLatency => calls::IOCTL_GET_LATENCY,
            _ => return Err(Error::NotSup),
        };
        let v = calls::portal_ioctl(self.gate(), portalid, gate_req, 0)?;
        Ok(v as u64)
    }
}

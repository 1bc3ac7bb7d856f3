//! Synchronization-point user API.
//!
//! A sync point is a one-shot rendezvous channel over the NoC, created
//! by the side that waits and opened by the sides that signal. Two
//! directions exist: all-to-one (followers signal, one node waits) and
//! one-to-all (one node signals, followers wait). The barrier composes
//! one of each.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::sys::calls;

pub use crate::sys::calls::SyncType;

fn valid_node_list(nodes: &[i32]) -> Result<()> {
    if nodes.len() < 2 {
        return Err(Error::Inval);
    }
    Ok(())
}

impl Runtime {
    /// Create the waiting side of a sync point over `nodes`.
    pub fn sync_create(&self, nodes: &[i32], kind: SyncType) -> Result<i32> {
        valid_node_list(nodes)?;
        calls::sync_create(self.gate(), nodes, kind)
    }

    /// Open the signalling side of a sync point over `nodes`.
    pub fn sync_open(&self, nodes: &[i32], kind: SyncType) -> Result<i32> {
        valid_node_list(nodes)?;
        calls::sync_open(self.gate(), nodes, kind)
    }

    /// Destroy a created sync point.
    pub fn sync_unlink(&self, syncid: i32) -> Result<()> {
        calls::sync_unlink(self.gate(), syncid)
    }

    /// Close an opened sync point.
    pub fn sync_close(&self, syncid: i32) -> Result<()> {
        calls::sync_close(self.gate(), syncid)
    }

    /// Suspend until the sync point fires.
    pub fn sync_wait(&self, syncid: i32) -> Result<()> {
        calls::sync_wait(self.gate(), syncid)
    }

    /// Fire the sync point towards its waiters.
    pub fn sync_signal(&self, syncid: i32) -> Result<()> {
        calls::sync_signal(self.gate(), syncid)
    }
}

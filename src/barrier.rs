//! Barrier over two sync points.
//!
//! `nodes[0]` is the leader. The leader creates the all-to-one channel
//! and opens the one-to-all; every follower does the reverse. A wait is
//! then one round trip: followers signal all-to-one and park on
//! one-to-all; the leader parks on all-to-one until everyone has
//! signalled, then releases the group through one-to-all. No node can
//! leave before the last one has entered.

use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::sync::SyncType;

/// A formed barrier: two sync ids plus the leader's node id.
#[derive(Debug, Clone, Copy)]
pub struct Barrier {
    /// `[all-to-one, one-to-all]`.
    syncs: [i32; 2],
    leader: i32,
}

impl Runtime {
    /// Form a barrier between `nodes` (at least two; `nodes[0]` leads).
    pub fn barrier_create(&self, nodes: &[i32]) -> Result<Barrier> {
        if nodes.len() < 2 {
            return Err(Error::Inval);
        }

        let leader = nodes[0];
        let syncs = if self.node() == leader {
            [
                self.sync_create(nodes, SyncType::AllToOne)?,
                self.sync_open(nodes, SyncType::OneToAll)?,
            ]
        } else {
            [
                self.sync_open(nodes, SyncType::AllToOne)?,
                self.sync_create(nodes, SyncType::OneToAll)?,
            ]
        };

        log::info!(
            "barrier: node {} joined ({} nodes, leader {})",
            self.node(),
            nodes.len(),
            leader
        );
        Ok(Barrier { syncs, leader })
    }

    /// Suspend until every participant has entered the barrier.
    pub fn barrier_wait(&self, barrier: &Barrier) -> Result<()> {
        let mut ret = Ok(());

        if self.node() == barrier.leader {
            if let Err(e) = self.sync_wait(barrier.syncs[0]) {
                ret = Err(e);
            }
            if let Err(e) = self.sync_signal(barrier.syncs[1]) {
                ret = Err(e);
            }
        } else {
            if let Err(e) = self.sync_signal(barrier.syncs[0]) {
                ret = Err(e);
            }
            if let Err(e) = self.sync_wait(barrier.syncs[1]) {
                ret = Err(e);
            }
        }

        ret
    }

    /// Tear the barrier down; destruction mirrors creation.
    pub fn barrier_destroy(&self, barrier: Barrier) -> Result<()> {
        let mut ret = Ok(());

        if self.node() == barrier.leader {
            if let Err(e) = self.sync_unlink(barrier.syncs[0]) {
                ret = Err(e);
            }
            if let Err(e) = self.sync_close(barrier.syncs[1]) {
                ret = Err(e);
            }
        } else {
            if let Err(e) = self.sync_close(barrier.syncs[0]) {
                ret = Err(e);
            }
            if let Err(e) = self.sync_unlink(barrier.syncs[1]) {
                ret = Err(e);
            }
        }

        ret
    }
}

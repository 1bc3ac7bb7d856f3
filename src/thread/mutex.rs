//! Fair mutex with POSIX-style kinds.
//!
//! Waiters queue in FIFO order by thread id and the head is handed the
//! lock at unlock time, so no thread can barge past an earlier arrival.
//! The queue lives in a fixed-capacity table guarded by a raw spinlock;
//! suspension is `park`, hand-off is `unpark` of the head.

use std::thread::{self, Thread, ThreadId};

use heapless::Vec;

use crate::config::{CORES_MAX, THREAD_MAX};
use crate::error::{Error, Result};

/// Waiter table capacity: every user thread plus every dispatcher.
const WAITERS_MAX: usize = THREAD_MAX + CORES_MAX;

/// Mutex behavior on re-lock and foreign unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutexKind {
    /// No ownership checking; re-lock by the owner deadlocks.
    #[default]
    Normal,
    /// Re-lock by the owner reports `Deadlk`; foreign unlock `Perm`.
    ErrorCheck,
    /// Re-lock by the owner nests; a level counter tracks depth.
    Recursive,
}

struct MutexState {
    locked: bool,
    owner: Option<ThreadId>,
    rlevel: u32,
    /// FIFO of waiting threads. The head is the next owner.
    queue: Vec<(ThreadId, Thread), WAITERS_MAX>,
}

/// Fair FIFO mutex.
///
/// Unlike `std` mutexes this is a raw lock/unlock gate (no guard, no
/// poisoning): the shape the rest of the runtime and its tests expect
/// from a thread primitive that mirrors the kernel's.
pub struct Mutex {
    kind: MutexKind,
    state: spin::Mutex<MutexState>,
}

impl Mutex {
    pub fn new(kind: MutexKind) -> Self {
        Self {
            kind,
            state: spin::Mutex::new(MutexState {
                locked: false,
                owner: None,
                rlevel: 0,
                queue: Vec::new(),
            }),
        }
    }

    pub fn kind(&self) -> MutexKind {
        self.kind
    }

    /// Acquire the mutex, suspending until it is this thread's turn.
    pub fn lock(&self) -> Result<()> {
        let me = thread::current();
        let tid = me.id();

        // Re-lock handling before joining the queue.
        {
            let mut st = self.state.lock();
            if st.locked && st.owner == Some(tid) {
                match self.kind {
                    MutexKind::ErrorCheck => return Err(Error::Deadlk),
                    MutexKind::Recursive => {
                        st.rlevel += 1;
                        return Ok(());
                    }
                    MutexKind::Normal => {} // No ownership check: deadlocks below.
                }
            }
            if st.queue.push((tid, me.clone())).is_err() {
                return Err(Error::Busy);
            }
        }

        loop {
            {
                let mut st = self.state.lock();
                // Lock free and it is my turn.
                if !st.locked && st.queue.first().map(|(t, _)| *t) == Some(tid) {
                    st.queue.remove(0);
                    st.locked = true;
                    st.owner = Some(tid);
                    st.rlevel = 1;
                    return Ok(());
                }
            }
            thread::park();
        }
    }

    /// Acquire without suspending. `Busy` when contended.
    pub fn try_lock(&self) -> Result<()> {
        let tid = thread::current().id();
        let mut st = self.state.lock();

        if st.locked {
            if self.kind == MutexKind::Recursive && st.owner == Some(tid) {
                st.rlevel += 1;
                return Ok(());
            }
            return Err(Error::Busy);
        }

        // Respect the queue: an empty lock with waiters is not free.
        if !st.queue.is_empty() {
            return Err(Error::Busy);
        }

        st.locked = true;
        st.owner = Some(tid);
        st.rlevel = 1;
        Ok(())
    }

    /// Release the mutex and hand it to the head waiter, if any.
    pub fn unlock(&self) -> Result<()> {
        let tid = thread::current().id();
        let mut st = self.state.lock();

        match self.kind {
            MutexKind::ErrorCheck => {
                if !st.locked || st.owner != Some(tid) {
                    return Err(Error::Perm);
                }
            }
            MutexKind::Recursive => {
                if !st.locked || st.owner != Some(tid) || st.rlevel == 0 {
                    return Err(Error::Perm);
                }
                st.rlevel -= 1;
                if st.rlevel != 0 {
                    return Ok(());
                }
            }
            MutexKind::Normal => {}
        }

        st.locked = false;
        st.owner = None;
        if let Some((_, head)) = st.queue.first() {
            head.unpark();
        }
        Ok(())
    }

    /// Whether the mutex is currently held. Snapshot only.
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Number of threads queued for the lock. Snapshot only.
    pub fn waiters(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new(MutexKind::Normal)
    }
}

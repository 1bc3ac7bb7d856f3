//! Thread-layer primitives.
//!
//! The runtime distinguishes exactly two kinds of threads: dispatchers
//! (one per configured core, spawned here with a name and a core hint)
//! and user threads (everything else). User threads get a stable slot
//! index below [`THREAD_MAX`](crate::config::THREAD_MAX) on first
//! contact; the slot keys the user flow pool, which is what gives the
//! single-flow-per-thread guarantee its teeth.
//!
//! Suspension everywhere in this crate bottoms out in `park`/`unpark`:
//! the portable analog of the kernel's sleep/wakeup pair.

pub mod completion;
pub mod condvar;
pub mod mutex;

use std::thread::{self, JoinHandle, ThreadId};

use crate::config::THREAD_MAX;
use crate::error::{Error, Result};

// ── Core-pinned dispatcher spawn ──────────────────────────────

/// Spawn a named dispatcher thread for a logical core.
///
/// On targets with affinity control the core hint pins the thread; the
/// host build records the hint in the log and spawns plainly, which is
/// sufficient for functional behavior (queues are still per-core).
pub fn spawn_on_core(
    core: usize,
    name: &str,
    f: impl FnOnce() + Send + 'static,
) -> JoinHandle<()> {
    log::info!("thread: spawning '{}' for core {}", name, core);

    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .expect("spawn_on_core: thread creation failed")
}

// ── User-thread registry ──────────────────────────────────────

/// Fixed table assigning each user thread a stable small slot.
pub struct ThreadRegistry {
    slots: spin::Mutex<[Option<ThreadId>; THREAD_MAX]>,
}

impl ThreadRegistry {
    pub const fn new() -> Self {
        Self {
            slots: spin::Mutex::new([None; THREAD_MAX]),
        }
    }

    /// Slot of the calling thread, registering it on first contact.
    ///
    /// Fails with `Busy` once `THREAD_MAX` distinct threads have
    /// registered; slots are not recycled.
    pub fn slot_of_current(&self) -> Result<usize> {
        let me = thread::current().id();
        let mut slots = self.slots.lock();

        let mut free = None;
        for (i, slot) in slots.iter().enumerate() {
            match slot {
                Some(tid) if *tid == me => return Ok(i),
                None if free.is_none() => free = Some(i),
                _ => {}
            }
        }

        match free {
            Some(i) => {
                slots[i] = Some(me);
                Ok(i)
            }
            None => Err(Error::Busy),
        }
    }

    /// Number of registered threads.
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

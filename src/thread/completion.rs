//! Completion gate: the task completion semaphore.
//!
//! An at-most-one-waiter gate. The dispatcher posts a signed value when
//! a task reaches a terminal state; a single thread may be suspended in
//! `wait` to receive it. `try_wait` is the non-suspending probe the
//! dispatcher itself is restricted to.

use std::thread::{self, Thread};

use crate::error::{Error, Result};

struct CompletionState {
    posted: bool,
    value: i32,
    waiter: Option<Thread>,
}

/// One-shot, re-armable completion gate.
pub struct Completion {
    state: spin::Mutex<CompletionState>,
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            state: spin::Mutex::new(CompletionState {
                posted: false,
                value: 0,
                waiter: None,
            }),
        }
    }

    /// Post a value and release the waiter, if one is suspended.
    ///
    /// Re-posting before the previous value was consumed overwrites it;
    /// the gate is re-armed by the consuming `wait`/`try_wait`.
    pub fn post(&self, value: i32) {
        let mut st = self.state.lock();
        st.posted = true;
        st.value = value;
        if let Some(waiter) = st.waiter.take() {
            waiter.unpark();
        }
    }

    /// Suspend until a value is posted, then consume it.
    ///
    /// # Panics
    ///
    /// Panics if another thread is already suspended here: the gate is
    /// at-most-one-waiter by construction and a second waiter is a bug
    /// in the runtime, not a recoverable condition.
    pub fn wait(&self) -> i32 {
        let me = thread::current();
        loop {
            {
                let mut st = self.state.lock();
                if st.posted {
                    st.posted = false;
                    st.waiter = None;
                    return st.value;
                }
                match &st.waiter {
                    None => st.waiter = Some(me.clone()),
                    // A spurious unpark lands back here; keep waiting.
                    Some(w) if w.id() == me.id() => {}
                    Some(_) => panic!("completion: second waiter on a one-waiter gate"),
                }
            }
            thread::park();
        }
    }

    /// Consume the posted value without suspending.
    /// `Proto` when nothing has been posted yet.
    pub fn try_wait(&self) -> Result<i32> {
        let mut st = self.state.lock();
        if !st.posted {
            return Err(Error::Proto);
        }
        st.posted = false;
        Ok(st.value)
    }

    /// Drop any posted-but-unconsumed value.
    pub fn reset(&self) {
        let mut st = self.state.lock();
        st.posted = false;
        st.value = 0;
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

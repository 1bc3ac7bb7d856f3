//! Condition variable with FIFO wakeup.
//!
//! Waiters queue in arrival order; `signal` wakes the head, `broadcast`
//! drains the queue. `wait` atomically releases the supplied mutex,
//! suspends, and re-acquires it before returning, so the caller's
//! predicate check stays under the lock on both sides.

use std::thread::{self, Thread, ThreadId};

use heapless::Vec;

use crate::config::{CORES_MAX, THREAD_MAX};
use crate::error::{Error, Result};
use crate::thread::mutex::Mutex;

const WAITERS_MAX: usize = THREAD_MAX + CORES_MAX;

/// FIFO condition variable.
pub struct Condvar {
    queue: spin::Mutex<Vec<(ThreadId, Thread), WAITERS_MAX>>,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            queue: spin::Mutex::new(Vec::new()),
        }
    }

    /// Release `mutex`, suspend until signalled, re-acquire `mutex`.
    pub fn wait(&self, mutex: &Mutex) -> Result<()> {
        let me = thread::current();
        let tid = me.id();

        {
            let mut q = self.queue.lock();
            if q.push((tid, me.clone())).is_err() {
                return Err(Error::Busy);
            }
        }

        if let Err(e) = mutex.unlock() {
            // Never wait on a mutex the caller does not hold.
            self.queue.lock().retain(|(t, _)| *t != tid);
            return Err(e);
        }

        // A signal removes us from the queue before unparking, so
        // membership is the wakeup predicate; parks may be spurious.
        loop {
            {
                let q = self.queue.lock();
                if !q.iter().any(|(t, _)| *t == tid) {
                    break;
                }
            }
            thread::park();
        }

        mutex.lock()
    }

    /// Wake the head waiter, if any.
    pub fn signal(&self) -> Result<()> {
        let mut q = self.queue.lock();
        if !q.is_empty() {
            let (_, head) = q.remove(0);
            head.unpark();
        }
        Ok(())
    }

    /// Wake every waiter.
    pub fn broadcast(&self) -> Result<()> {
        let mut q = self.queue.lock();
        while !q.is_empty() {
            let (_, head) = q.remove(0);
            head.unpark();
        }
        Ok(())
    }

    /// Number of threads currently waiting. Snapshot only.
    pub fn waiters(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::mutex::MutexKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn signal_wakes_single_waiter() {
        let m = Arc::new(Mutex::new(MutexKind::Normal));
        let cv = Arc::new(Condvar::new());
        let woke = Arc::new(AtomicU32::new(0));

        let (m2, cv2, woke2) = (Arc::clone(&m), Arc::clone(&cv), Arc::clone(&woke));
        let waiter = thread::spawn(move || {
            m2.lock().unwrap();
            cv2.wait(&m2).unwrap();
            woke2.fetch_add(1, Ordering::SeqCst);
            m2.unlock().unwrap();
        });

        while cv.waiters() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(woke.load(Ordering::SeqCst), 0);

        cv.signal().unwrap();
        waiter.join().unwrap();
        assert_eq!(woke.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn broadcast_wakes_all() {
        let m = Arc::new(Mutex::new(MutexKind::Normal));
        let cv = Arc::new(Condvar::new());
        let woke = Arc::new(AtomicU32::new(0));

        let mut handles = std::vec::Vec::new();
        for _ in 0..3 {
            let (m2, cv2, woke2) = (Arc::clone(&m), Arc::clone(&cv), Arc::clone(&woke));
            handles.push(thread::spawn(move || {
                m2.lock().unwrap();
                cv2.wait(&m2).unwrap();
                woke2.fetch_add(1, Ordering::SeqCst);
                m2.unlock().unwrap();
            }));
        }

        while cv.waiters() < 3 {
            thread::sleep(Duration::from_millis(1));
        }

        cv.broadcast().unwrap();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(woke.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn signal_with_no_waiters_is_noop() {
        let cv = Condvar::new();
        cv.signal().unwrap();
        cv.broadcast().unwrap();
        assert_eq!(cv.waiters(), 0);
    }
}

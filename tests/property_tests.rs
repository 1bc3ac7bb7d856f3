//! Property tests for structural invariants of the runtime.

use std::sync::Arc;

use proptest::prelude::*;

use noclink::sys::sim::SimFabric;
use noclink::thread::completion::Completion;
use noclink::thread::mutex::{Mutex, MutexKind};
use noclink::{Dependency, Error, Runtime, RuntimeConfig, TaskExit, TaskRun, Trigger};

fn launch() -> Arc<Runtime> {
    Runtime::launch(&RuntimeConfig::default(), SimFabric::new().node(0)).unwrap()
}

fn noop(_run: &TaskRun<'_>) -> TaskExit {
    TaskExit::success(0)
}

/// Reference cycle check over an adjacency list.
fn closes_cycle(edges: &[(usize, usize)], from: usize, to: usize) -> bool {
    // Adding from→to creates a cycle iff `from` is reachable from `to`.
    let mut stack = vec![to];
    let mut seen = vec![to];
    while let Some(n) = stack.pop() {
        if n == from {
            return true;
        }
        for &(a, b) in edges {
            if a == n && !seen.contains(&b) {
                seen.push(b);
                stack.push(b);
            }
        }
    }
    false
}

proptest! {
    /// `connect` accepts exactly the edges a reference model calls
    /// acyclic, non-duplicate and non-self; the accepted graph is
    /// therefore always a DAG.
    #[test]
    fn connect_admits_exactly_the_acyclic_edges(
        raw_edges in proptest::collection::vec((0usize..6, 0usize..6), 0..24),
    ) {
        let rt = launch();
        let tasks: Vec<_> = (0..6).map(|_| rt.task_create(noop, 0).unwrap()).collect();

        let mut accepted: Vec<(usize, usize)> = Vec::new();
        for (a, b) in raw_edges {
            let verdict = rt.task_connect(tasks[a], tasks[b], Dependency::Hard, Trigger::Default);

            let self_edge = a == b;
            let duplicate = accepted.contains(&(a, b));
            let cyclic = !self_edge && closes_cycle(&accepted, a, b);
            let model_ok = !(self_edge || duplicate || cyclic);

            match verdict {
                Ok(()) => {
                    prop_assert!(model_ok, "accepted edge {}→{} breaks the model", a, b);
                    accepted.push((a, b));
                }
                Err(Error::Inval) => prop_assert!(!model_ok),
                // Full edge tables are legal refusals.
                Err(Error::Busy) => {}
                Err(e) => prop_assert!(false, "unexpected error {:?}", e),
            }
        }
        rt.shutdown();
    }

    /// Lifecycle counters never decrease, whatever the op sequence.
    #[test]
    fn mailbox_counters_are_monotone(ops in proptest::collection::vec(0u8..4, 1..24)) {
        let rt = launch();
        let mut live: Vec<i32> = Vec::new();
        let mut prev = [0u64; 4];

        for op in ops {
            match op {
                0 => {
                    if let Ok(id) = rt.mailbox_create(0, (live.len() % 8) as i32) {
                        live.push(id);
                    }
                }
                1 => {
                    if let Some(id) = live.pop() {
                        rt.mailbox_unlink(id).unwrap();
                    }
                }
                2 => {
                    let id = rt.mailbox_open(1, 0).unwrap();
                    rt.mailbox_close(id).unwrap();
                }
                _ => {
                    // Failed validation must not advance anything.
                    let mut oversize = [0u8; 121];
                    prop_assert!(rt.mailbox_read(0, &mut oversize).is_err());
                }
            }

            let now = [
                rt.mailbox_ioctl(0, noclink::CommIoctl::GetNCreates).unwrap(),
                rt.mailbox_ioctl(0, noclink::CommIoctl::GetNUnlinks).unwrap(),
                rt.mailbox_ioctl(0, noclink::CommIoctl::GetNOpens).unwrap(),
                rt.mailbox_ioctl(0, noclink::CommIoctl::GetNCloses).unwrap(),
            ];
            for (p, n) in prev.iter().zip(now.iter()) {
                prop_assert!(n >= p, "counter went backwards: {:?} -> {:?}", prev, now);
            }
            prev = now;
        }
        rt.shutdown();
    }

    /// Gate code mapping is a bijection on the error set, and the
    /// transient predicate matches the retry set exactly.
    #[test]
    fn error_codes_round_trip(raw in -200i32..0) {
        if let Some(e) = Error::from_code(raw) {
            prop_assert_eq!(e.code(), raw);
            let transient = matches!(
                e,
                Error::Busy | Error::Again | Error::Acces | Error::NoMsg | Error::TimedOut
            );
            prop_assert_eq!(e.is_transient(), transient);
        }
    }

    /// An error-checking mutex driven single-threaded behaves exactly
    /// like the model: Deadlk on re-lock, Perm on spurious unlock.
    #[test]
    fn errorcheck_mutex_matches_model(ops in proptest::collection::vec(0u8..3, 1..32)) {
        let m = Mutex::new(MutexKind::ErrorCheck);
        let mut held = false;

        for op in ops {
            match op {
                0 => {
                    let r = m.lock();
                    if held {
                        prop_assert_eq!(r, Err(Error::Deadlk));
                    } else {
                        prop_assert_eq!(r, Ok(()));
                        held = true;
                    }
                }
                1 => {
                    let r = m.unlock();
                    if held {
                        prop_assert_eq!(r, Ok(()));
                        held = false;
                    } else {
                        prop_assert_eq!(r, Err(Error::Perm));
                    }
                }
                _ => {
                    let r = m.try_lock();
                    if held {
                        prop_assert_eq!(r, Err(Error::Busy));
                    } else {
                        prop_assert_eq!(r, Ok(()));
                        held = true;
                    }
                }
            }
        }
    }

    /// A completion gate hands back exactly the posted value.
    #[test]
    fn completion_round_trips_values(v in any::<i32>()) {
        let c = Completion::new();
        prop_assert_eq!(c.try_wait(), Err(Error::Proto));
        c.post(v);
        prop_assert_eq!(c.try_wait(), Ok(v));
        prop_assert_eq!(c.try_wait(), Err(Error::Proto));
    }
}

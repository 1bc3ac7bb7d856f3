//! Integration tests: mailbox and portal transfers over the sim fabric,
//! transient-error retry against a stub gate, and the barrier.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread;

use noclink::sys::sim::SimFabric;
use noclink::sys::{KernelGate, nr};
use noclink::{CommIoctl, Error, Runtime, RuntimeConfig, TaskExit, TaskRun};

fn launch_on(fabric: &Arc<SimFabric>, node: i32) -> Arc<Runtime> {
    Runtime::launch(&RuntimeConfig::default(), fabric.node(node)).unwrap()
}

// ── Mailbox transfers ─────────────────────────────────────────

#[test]
fn ping_pong_mailbox() {
    let fabric = SimFabric::new();
    let rt0 = launch_on(&fabric, 0);
    let rt1 = launch_on(&fabric, 1);

    let inbox = rt0.mailbox_create(0, 0).unwrap();

    let writer = {
        let rt1 = Arc::clone(&rt1);
        thread::spawn(move || {
            let out = rt1.mailbox_open(0, 0).unwrap();
            let buf = [0x5Au8; 120];
            assert_eq!(rt1.mailbox_write(out, &buf).unwrap(), 120);
            out
        })
    };

    let mut buf = [0u8; 120];
    assert_eq!(rt0.mailbox_read(inbox, &mut buf).unwrap(), 120);
    assert!(buf.iter().all(|b| *b == 0x5A));

    let out = writer.join().unwrap();
    assert_eq!(rt0.mailbox_ioctl(inbox, CommIoctl::GetNReads).unwrap(), 1);
    assert_eq!(rt1.mailbox_ioctl(out, CommIoctl::GetNWrites).unwrap(), 1);
    assert_eq!(rt0.mailbox_ioctl(inbox, CommIoctl::GetVolume).unwrap(), 120);
    assert_eq!(rt1.mailbox_ioctl(out, CommIoctl::GetVolume).unwrap(), 120);
    assert!(rt0.mailbox_ioctl(inbox, CommIoctl::GetLatency).unwrap() > 0);

    rt0.shutdown();
    rt1.shutdown();
}

#[test]
fn mailbox_size_validation() {
    let fabric = SimFabric::new();
    let rt = launch_on(&fabric, 0);
    let inbox = rt.mailbox_create(0, 1).unwrap();

    let mut empty: [u8; 0] = [];
    assert_eq!(rt.mailbox_read(inbox, &mut empty), Err(Error::Inval));

    let mut oversize = [0u8; 121];
    assert_eq!(rt.mailbox_read(inbox, &mut oversize), Err(Error::Inval));
    assert_eq!(rt.mailbox_write(inbox, &oversize), Err(Error::Inval));

    // Failed validation advances no counters.
    assert_eq!(rt.mailbox_ioctl(inbox, CommIoctl::GetNReads).unwrap(), 0);
    rt.shutdown();
}

#[test]
fn mailbox_lifecycle_counters_balance() {
    let fabric = SimFabric::new();
    let rt = launch_on(&fabric, 0);

    let a = rt.mailbox_create(0, 2).unwrap();
    let b = rt.mailbox_create(0, 3).unwrap();
    rt.mailbox_unlink(a).unwrap();
    rt.mailbox_unlink(b).unwrap();

    assert_eq!(rt.mailbox_ioctl(0, CommIoctl::GetNCreates).unwrap(), 2);
    assert_eq!(rt.mailbox_ioctl(0, CommIoctl::GetNUnlinks).unwrap(), 2);

    // Unlinked ids are reclaimable: the port can be created again.
    let again = rt.mailbox_create(0, 2).unwrap();
    rt.mailbox_unlink(again).unwrap();
    rt.shutdown();
}

#[test]
fn double_unlink_and_foreign_unlink_are_badf() {
    let fabric = SimFabric::new();
    let rt = launch_on(&fabric, 0);

    let inbox = rt.mailbox_create(0, 4).unwrap();
    rt.mailbox_unlink(inbox).unwrap();
    assert_eq!(rt.mailbox_unlink(inbox), Err(Error::Badf));

    // `unlink` of an `open`ed id is refused too.
    let out = rt.mailbox_open(9, 0).unwrap();
    assert_eq!(rt.mailbox_unlink(out), Err(Error::Badf));
    rt.mailbox_close(out).unwrap();
    rt.shutdown();
}

// ── Portal transfers ──────────────────────────────────────────

#[test]
fn portal_chunked_transfer() {
    let fabric = SimFabric::new();
    let rt0 = launch_on(&fabric, 0);
    let rt1 = launch_on(&fabric, 1);

    const PORT: i32 = 5;
    const SIZE: usize = 3000; // 1024 + 1024 + 952

    let pin = rt0.portal_create(0, PORT).unwrap();
    rt0.portal_allow(pin, 1, PORT).unwrap();

    let writer = {
        let rt1 = Arc::clone(&rt1);
        thread::spawn(move || {
            let pout = rt1.portal_open(1, 0, PORT).unwrap();
            let data: Vec<u8> = (0..SIZE).map(|i| (i % 251) as u8).collect();
            assert_eq!(rt1.portal_write(pout, &data).unwrap(), SIZE);
            pout
        })
    };

    let mut buf = vec![0u8; SIZE];
    assert_eq!(rt0.portal_read(pin, &mut buf).unwrap(), SIZE);
    for (i, b) in buf.iter().enumerate() {
        assert_eq!(*b, (i % 251) as u8, "byte {} corrupted", i);
    }

    let pout = writer.join().unwrap();
    assert_eq!(rt0.portal_ioctl(pin, CommIoctl::GetVolume).unwrap(), SIZE as u64);
    assert_eq!(rt1.portal_ioctl(pout, CommIoctl::GetVolume).unwrap(), SIZE as u64);
    assert_eq!(rt0.portal_ioctl(pin, CommIoctl::GetNReads).unwrap(), 1);
    assert_eq!(rt1.portal_ioctl(pout, CommIoctl::GetNWrites).unwrap(), 1);

    // A completed read consumed the allow: a new one is accepted.
    rt0.portal_allow(pin, 1, PORT).unwrap();

    rt0.shutdown();
    rt1.shutdown();
}

#[test]
fn allow_twice_without_read_is_busy() {
    let fabric = SimFabric::new();
    let rt = launch_on(&fabric, 0);

    let pin = rt.portal_create(0, 6).unwrap();
    rt.portal_allow(pin, 1, 6).unwrap();
    assert_eq!(rt.portal_allow(pin, 1, 6), Err(Error::Busy));
    rt.shutdown();
}

#[test]
fn portal_size_validation() {
    let fabric = SimFabric::new();
    let rt = launch_on(&fabric, 0);
    let pin = rt.portal_create(0, 7).unwrap();

    let mut empty: [u8; 0] = [];
    assert_eq!(rt.portal_read(pin, &mut empty), Err(Error::Inval));

    // Creating a portal for a foreign node is refused.
    assert_eq!(rt.portal_create(3, 7), Err(Error::Inval));
    rt.shutdown();
}

// ── Transient retry against a stub gate ───────────────────────

/// Gate whose mailbox write configuration fails transiently twice
/// before accepting; everything else succeeds immediately.
struct FlakyGate {
    attempts: AtomicU32,
}

impl KernelGate for FlakyGate {
    fn call0(&self, _nr: usize) -> isize {
        0 // node_get_num / dcache_invalidate
    }

    fn call1(&self, nr: usize, _a: usize) -> isize {
        match nr {
            nr::MAILBOX_WAIT => 0, // Transfer completes on first probe.
            _ => 0,
        }
    }

    fn call2(&self, _nr: usize, _a: usize, _b: usize) -> isize {
        0
    }

    fn call3(&self, nr: usize, _a: usize, _b: usize, c: usize) -> isize {
        match nr {
            nr::MAILBOX_AWRITE => {
                let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 2 {
                    Error::Busy.code() as isize
                } else {
                    c as isize
                }
            }
            _ => 0,
        }
    }
}

#[test]
fn transient_errors_are_retried_not_surfaced() {
    let gate = Arc::new(FlakyGate {
        attempts: AtomicU32::new(0),
    });
    let gate_dyn: Arc<dyn KernelGate> = gate.clone();
    let rt = Runtime::launch(&RuntimeConfig::default(), gate_dyn).unwrap();

    let buf = [0xA5u8; 64];
    assert_eq!(rt.mailbox_awrite(5, &buf).unwrap(), 64);
    rt.mailbox_wait(5).unwrap();

    // Two EBUSY rounds re-entered the config task through the queue.
    assert_eq!(gate.attempts.load(Ordering::SeqCst), 3);
    rt.shutdown();
}

// ── Dispatcher-originated flows ───────────────────────────────

/// Shared state for [`flow_driver`], leaked by the test so it outlives
/// every re-entry of the body.
struct DriverState {
    configured: AtomicBool,
    probes: AtomicU32,
}

/// Task body that drives a mailbox write from the dispatcher itself:
/// configure once, then probe completion without suspending, yielding
/// through AGAIN until the flow has finished.
fn flow_driver(run: &TaskRun<'_>) -> TaskExit {
    let mbxid = run.args[0] as i32;
    let state = unsafe { &*(run.args[2] as *const DriverState) };

    if !state.configured.swap(true, Ordering::SeqCst) {
        // The payload is leaked by the test: it outlives the flow even
        // though the transfer completes after this body returns.
        let payload = unsafe { std::slice::from_raw_parts(run.args[1] as *const u8, 32) };
        if let Err(e) = run.rt.mailbox_awrite(mbxid, payload) {
            return TaskExit::error(e.code());
        }
    }

    // On a dispatcher thread this is the non-suspending probe; a flow
    // still in flight reports Proto and the body retries via AGAIN.
    match run.rt.mailbox_wait(mbxid) {
        Ok(()) => TaskExit::success(state.probes.load(Ordering::SeqCst) as i32),
        Err(Error::Proto) => {
            state.probes.fetch_add(1, Ordering::SeqCst);
            TaskExit::again()
        }
        Err(e) => TaskExit::error(e.code()),
    }
}

#[test]
fn dispatcher_originated_flow_probes_without_suspending() {
    let fabric = SimFabric::new();
    let rt = launch_on(&fabric, 0);

    let inbox = rt.mailbox_create(0, 8).unwrap();
    let out = rt.mailbox_open(0, 8).unwrap();

    let payload: &'static [u8; 32] = Box::leak(Box::new([0x77u8; 32]));
    let state: &'static DriverState = Box::leak(Box::new(DriverState {
        configured: AtomicBool::new(false),
        probes: AtomicU32::new(0),
    }));

    let driver = rt.task_create(flow_driver, 0).unwrap();
    rt.task_dispatch(
        driver,
        out as usize,
        payload.as_ptr() as usize,
        state as *const DriverState as usize,
    )
    .unwrap();

    // The body never blocks its own core: it observes completion
    // through probes, and at least one lands before the flow is done.
    let probes = rt.task_wait(driver).unwrap();
    assert!(probes >= 1, "flow completed without a pending probe");

    // The frame really went out: the reader drains it.
    let mut buf = [0u8; 32];
    assert_eq!(rt.mailbox_read(inbox, &mut buf).unwrap(), 32);
    assert!(buf.iter().all(|b| *b == 0x77));

    rt.shutdown();
}

// ── Barrier ───────────────────────────────────────────────────

#[test]
fn barrier_of_four_nodes() {
    let fabric = SimFabric::new();
    let nodes = [0, 1, 2, 3];
    let entered = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for &node in &nodes {
        let fabric = Arc::clone(&fabric);
        let entered = Arc::clone(&entered);
        handles.push(thread::spawn(move || {
            let rt = launch_on(&fabric, node);
            let barrier = rt.barrier_create(&[0, 1, 2, 3]).unwrap();

            entered.fetch_add(1, Ordering::SeqCst);
            rt.barrier_wait(&barrier).unwrap();
            // Nobody leaves before the last participant has entered.
            assert_eq!(entered.load(Ordering::SeqCst), 4);

            rt.barrier_destroy(barrier).unwrap();
            rt.shutdown();
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn barrier_needs_two_nodes() {
    let fabric = SimFabric::new();
    let rt = launch_on(&fabric, 0);
    assert_eq!(rt.barrier_create(&[0]).err(), Some(Error::Inval));
    rt.shutdown();
}

//! Integration tests: task graph engine end to end over the sim gate.
//!
//! Each test launches a runtime on a private fabric, builds a small
//! graph through the public task API, and observes execution through
//! shared state passed to the bodies by pointer — the same way real
//! graph users thread context through the argument window.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use noclink::sys::sim::SimFabric;
use noclink::{
    Dependency, Error, Runtime, RuntimeConfig, TaskExit, TaskId, TaskRun, Trigger,
};

fn launch(cores: usize) -> Arc<Runtime> {
    let cfg = RuntimeConfig {
        cores,
        ..RuntimeConfig::default()
    };
    Runtime::launch(&cfg, SimFabric::new().node(0)).unwrap()
}

/// Leak a value and hand its address around through task arguments.
fn leak<T>(v: T) -> (&'static T, usize) {
    let r: &'static T = Box::leak(Box::new(v));
    (r, r as *const T as usize)
}

// ── Bodies ────────────────────────────────────────────────────

/// Returns its first argument as the task return value.
fn return_arg(run: &TaskRun<'_>) -> TaskExit {
    TaskExit::success(run.args[0] as i32)
}

/// Appends its own id to the order list at `args[0]`, forwarding the
/// list pointer to its children.
fn record_id(run: &TaskRun<'_>) -> TaskExit {
    // The list outlives the graph (leaked by the test).
    let order = unsafe { &*(run.args[0] as *const std::sync::Mutex<Vec<u32>>) };
    order.lock().unwrap().push(run.id.raw());
    TaskExit::success(0).publish1(run.args[0])
}

/// Bumps the counter at `args[0]`, forwarding the pointer.
fn bump(run: &TaskRun<'_>) -> TaskExit {
    let hits = unsafe { &*(run.args[0] as *const AtomicU32) };
    hits.fetch_add(1, Ordering::SeqCst);
    TaskExit::success(0).publish1(run.args[0])
}

/// Asks for two retries before succeeding with the attempt count.
fn retry_twice(run: &TaskRun<'_>) -> TaskExit {
    let hits = unsafe { &*(run.args[0] as *const AtomicU32) };
    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
    if n < 3 {
        TaskExit::again()
    } else {
        TaskExit::success(n as i32)
    }
}

/// Runs periodically until the third activation.
fn heartbeat(run: &TaskRun<'_>) -> TaskExit {
    let hits = unsafe { &*(run.args[0] as *const AtomicU32) };
    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
    if n < 3 {
        TaskExit::periodic(0)
    } else {
        TaskExit::success(n as i32)
    }
}

/// Fails with a protocol-level error code.
fn fail_nomsg(_run: &TaskRun<'_>) -> TaskExit {
    TaskExit::error(Error::NoMsg.code())
}

/// Attempts a blocking wait from inside a body; returns the outcome.
fn blocking_probe(run: &TaskRun<'_>) -> TaskExit {
    let other = unsafe { &*(run.args[0] as *const TaskId) };
    match run.rt.task_wait(*other) {
        Ok(v) => TaskExit::success(v),
        Err(e) => TaskExit::success(e.code()),
    }
}

/// Reports whether `task_current` names this task.
fn check_current(run: &TaskRun<'_>) -> TaskExit {
    let ok = run.rt.task_current() == Some(run.id);
    TaskExit::success(i32::from(ok))
}

/// Reports the core the body ran on.
fn report_core(run: &TaskRun<'_>) -> TaskExit {
    TaskExit::success(run.core as i32)
}

// ── Tests ─────────────────────────────────────────────────────

#[test]
fn wait_returns_the_task_value() {
    let rt = launch(1);
    let t = rt.task_create(return_arg, 0).unwrap();
    rt.task_dispatch(t, 7, 0, 0).unwrap();
    assert_eq!(rt.task_wait(t), Ok(7));
    rt.shutdown();
}

#[test]
fn dependency_gates_dispatch() {
    let rt = launch(1);
    let (hits, ptr) = leak(AtomicU32::new(0));

    let t0 = rt.task_create(bump, 0).unwrap();
    let t1 = rt.task_create(bump, 0).unwrap();
    rt.task_connect(t0, t1, Dependency::Hard, Trigger::Default)
        .unwrap();

    // The child cannot be dispatched while its parent is unfired.
    assert_eq!(rt.task_dispatch(t1, ptr, 0, 0), Err(Error::Busy));

    rt.task_dispatch(t0, ptr, 0, 0).unwrap();
    assert_eq!(rt.task_wait(t1), Ok(0));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    rt.shutdown();
}

#[test]
fn diamond_runs_in_one_of_two_orders() {
    let rt = launch(1);
    let (order, ptr) = leak(std::sync::Mutex::new(Vec::<u32>::new()));

    let a = rt.task_create(record_id, 0).unwrap();
    let b = rt.task_create(record_id, 0).unwrap();
    let c = rt.task_create(record_id, 0).unwrap();
    let d = rt.task_create(record_id, 0).unwrap();

    rt.task_connect(a, b, Dependency::Hard, Trigger::Default)
        .unwrap();
    rt.task_connect(a, c, Dependency::Hard, Trigger::Default)
        .unwrap();
    rt.task_connect(b, d, Dependency::Hard, Trigger::Default)
        .unwrap();
    rt.task_connect(c, d, Dependency::Hard, Trigger::Default)
        .unwrap();

    rt.task_dispatch(a, ptr, 0, 0).unwrap();
    assert_eq!(rt.task_wait(d), Ok(0));

    let seen = order.lock().unwrap().clone();
    let abcd = vec![a.raw(), b.raw(), c.raw(), d.raw()];
    let acbd = vec![a.raw(), c.raw(), b.raw(), d.raw()];
    assert!(
        seen == abcd || seen == acbd,
        "unexpected diamond order: {:?}",
        seen
    );
    rt.shutdown();
}

#[test]
fn multiple_parents_all_must_fire() {
    let rt = launch(1);
    let (hits, ptr) = leak(AtomicU32::new(0));

    let p0 = rt.task_create(record_id_noop, 0).unwrap();
    let p1 = rt.task_create(record_id_noop, 0).unwrap();
    let child = rt.task_create(bump, 0).unwrap();
    rt.task_connect(p0, child, Dependency::Hard, Trigger::Default)
        .unwrap();
    rt.task_connect(p1, child, Dependency::Hard, Trigger::Default)
        .unwrap();

    rt.task_dispatch(p0, ptr, 0, 0).unwrap();
    assert_eq!(rt.task_wait(p0), Ok(0));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(hits.load(Ordering::SeqCst), 0, "child ran with one parent");

    rt.task_dispatch(p1, ptr, 0, 0).unwrap();
    assert_eq!(rt.task_wait(child), Ok(0));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    rt.shutdown();
}

/// Forwards its first argument without recording anything.
fn record_id_noop(run: &TaskRun<'_>) -> TaskExit {
    TaskExit::success(0).publish1(run.args[0])
}

#[test]
fn again_reenqueues_until_success() {
    let rt = launch(1);
    let (hits, ptr) = leak(AtomicU32::new(0));

    let t = rt.task_create(retry_twice, 0).unwrap();
    rt.task_dispatch(t, ptr, 0, 0).unwrap();
    assert_eq!(rt.task_wait(t), Ok(3));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    rt.shutdown();
}

#[test]
fn periodic_reruns_after_its_period() {
    let rt = launch(1);
    let (hits, ptr) = leak(AtomicU32::new(0));

    let t = rt.task_create(heartbeat, 5).unwrap();
    rt.task_dispatch(t, ptr, 0, 0).unwrap();
    assert_eq!(rt.task_wait(t), Ok(3));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    rt.shutdown();
}

#[test]
fn error_aborts_the_chain() {
    let rt = launch(1);
    let (_, ptr) = leak(AtomicU32::new(0));

    let parent = rt.task_create(fail_nomsg, 0).unwrap();
    let child = rt.task_create(bump, 0).unwrap();
    rt.task_connect(parent, child, Dependency::Hard, Trigger::Default)
        .unwrap();

    rt.task_dispatch(parent, ptr, 0, 0).unwrap();
    // The waiter on the tail observes the ancestor's error code.
    assert_eq!(rt.task_wait(child), Ok(Error::NoMsg.code()));
    rt.shutdown();
}

#[test]
fn try_wait_probes_without_suspending() {
    let rt = launch(1);
    let t = rt.task_create(return_arg, 0).unwrap();

    // Nothing has completed yet: the probe refuses instead of blocking.
    assert_eq!(rt.task_try_wait(t), Err(Error::Proto));

    rt.task_dispatch(t, 9, 0, 0).unwrap();
    let mut value = None;
    for _ in 0..2000 {
        match rt.task_try_wait(t) {
            Ok(v) => {
                value = Some(v);
                break;
            }
            Err(Error::Proto) => std::thread::sleep(Duration::from_millis(1)),
            Err(e) => panic!("unexpected probe error: {}", e),
        }
    }
    assert_eq!(value, Some(9));

    // A successful probe consumes the completion.
    assert_eq!(rt.task_try_wait(t), Err(Error::Proto));
    rt.shutdown();
}

#[test]
fn dispatcher_side_blocking_is_refused() {
    let rt = launch(1);

    let other = rt.task_create(return_arg, 0).unwrap();
    let (_, ptr) = leak(other);

    let probe = rt.task_create(blocking_probe, 0).unwrap();
    rt.task_dispatch(probe, ptr, 0, 0).unwrap();
    assert_eq!(rt.task_wait(probe), Ok(Error::Proto.code()));
    rt.shutdown();
}

#[test]
fn current_names_the_running_task() {
    let rt = launch(1);
    let t = rt.task_create(check_current, 0).unwrap();
    rt.task_dispatch(t, 0, 0, 0).unwrap();
    assert_eq!(rt.task_wait(t), Ok(1));

    // Off the dispatcher there is no current task.
    assert_eq!(rt.task_current(), None);
    rt.shutdown();
}

#[test]
fn emit_pins_execution_to_a_core() {
    let rt = launch(2);
    let t = rt.task_create(report_core, 0).unwrap();
    rt.task_emit(t, 1, 0, 0, 0).unwrap();
    assert_eq!(rt.task_wait(t), Ok(1));

    // Out-of-range cores are rejected.
    let t2 = rt.task_create(report_core, 0).unwrap();
    assert_eq!(rt.task_emit(t2, 9, 0, 0, 0), Err(Error::Inval));
    rt.shutdown();
}

#[test]
fn connect_rejects_self_edges_and_cycles() {
    let rt = launch(1);
    let x = rt.task_create(return_arg, 0).unwrap();
    let y = rt.task_create(return_arg, 0).unwrap();
    let z = rt.task_create(return_arg, 0).unwrap();

    assert_eq!(
        rt.task_connect(x, x, Dependency::Hard, Trigger::Default),
        Err(Error::Inval)
    );

    rt.task_connect(x, y, Dependency::Hard, Trigger::Default)
        .unwrap();
    rt.task_connect(y, z, Dependency::Hard, Trigger::Default)
        .unwrap();
    assert_eq!(
        rt.task_connect(z, x, Dependency::Hard, Trigger::Default),
        Err(Error::Inval)
    );

    // Duplicate edges are rejected too.
    assert_eq!(
        rt.task_connect(x, y, Dependency::Hard, Trigger::Default),
        Err(Error::Inval)
    );
    rt.shutdown();
}

#[test]
fn stop_holds_a_task_until_resume() {
    let rt = launch(1);
    let (hits, ptr) = leak(AtomicU32::new(0));

    let t = rt.task_create(bump, 0).unwrap();
    rt.task_stop(t).unwrap();
    assert_eq!(rt.task_dispatch(t, ptr, 0, 0), Err(Error::Busy));

    rt.task_resume(t).unwrap();
    rt.task_dispatch(t, ptr, 0, 0).unwrap();
    assert_eq!(rt.task_wait(t), Ok(0));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    rt.shutdown();
}

#[test]
fn unlink_requires_disconnected_edges() {
    let rt = launch(1);
    let p = rt.task_create(return_arg, 0).unwrap();
    let c = rt.task_create(return_arg, 0).unwrap();
    rt.task_connect(p, c, Dependency::Hard, Trigger::Default)
        .unwrap();

    // Both peers are NotStarted, so the edge is live.
    assert_eq!(rt.task_unlink(c), Err(Error::Busy));

    rt.task_disconnect(p, c).unwrap();
    rt.task_unlink(c).unwrap();
    rt.task_unlink(p).unwrap();

    // Unlinked ids are stale.
    assert_eq!(rt.task_dispatch(p, 0, 0, 0), Err(Error::Inval));
    rt.shutdown();
}

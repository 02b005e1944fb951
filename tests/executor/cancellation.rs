//! Cancellation Tests
//!
//! Cancelling a queued task guarantees its body never runs. Cancelling a
//! running task only raises the flag its execution context reports.

use crate::common::*;
use sqlexec::{Concurrency, ExecError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::time::Duration;

#[test]
fn cancel_before_start_never_runs_body() {
    let (executor, recorder) = create_executor(Concurrency::Serial);

    // Occupy the only worker
    let gate = Arc::new(Barrier::new(2));
    let g = Arc::clone(&gate);
    let blocker = executor
        .submit(move |_c, _x| {
            g.wait();
            Ok(())
        })
        .unwrap();

    let ran = Arc::new(AtomicBool::new(false));
    let r = Arc::clone(&ran);
    let victim = executor
        .submit(move |_c, _x| {
            r.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    assert!(victim.cancel());
    assert!(victim.is_cancelled());
    assert!(victim.is_done());

    gate.wait();
    blocker.wait().unwrap();
    assert!(matches!(victim.wait(), Err(ExecError::Cancelled)));
    executor.drain();

    assert!(!ran.load(Ordering::SeqCst));
    // Only the blocker touched a connection
    assert_eq!(recorder.acquires(), 1);
    assert_eq!(recorder.releases(), 1);
    assert_eq!(executor.stats().cancelled, 1);
}

#[test]
fn cancel_running_task_only_sets_flag() {
    let (executor, recorder) = create_executor(Concurrency::Serial);
    let (started_tx, started_rx) = mpsc::channel();

    let pending = executor
        .submit(move |_c, ctx| -> anyhow::Result<()> {
            started_tx.send(()).unwrap();
            while !ctx.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            anyhow::bail!("stopped on request")
        })
        .unwrap();

    started_rx.recv().unwrap();
    assert!(!pending.cancel(), "a running task cannot be cancelled outright");

    let err = pending.wait().unwrap_err();
    assert_eq!(err.task_error().unwrap().to_string(), "stopped on request");
    assert_eq!(recorder.rollbacks(), 1);
    assert_eq!(recorder.releases(), 1);
}

#[test]
fn running_task_that_ignores_flag_commits() {
    let (executor, recorder) = create_executor(Concurrency::Serial);
    let (started_tx, started_rx) = mpsc::channel();
    let (proceed_tx, proceed_rx) = mpsc::channel::<()>();

    let pending = executor
        .submit(move |_c, _ctx| {
            started_tx.send(()).unwrap();
            proceed_rx.recv().unwrap();
            Ok("done anyway")
        })
        .unwrap();

    started_rx.recv().unwrap();
    pending.cancel();
    proceed_tx.send(()).unwrap();

    assert_eq!(pending.wait().unwrap(), "done anyway");
    assert_eq!(recorder.commits(), 1);
}

#[test]
fn cancel_handle_works_across_threads() {
    let (executor, _recorder) = create_executor(Concurrency::Serial);
    let gate = Arc::new(Barrier::new(2));
    let g = Arc::clone(&gate);
    let _blocker = executor
        .submit(move |_c, _x| {
            g.wait();
            Ok(())
        })
        .unwrap();

    let victim = executor.submit(|_c, _x| Ok(1)).unwrap();
    let handle = victim.cancel_handle();
    let canceller = std::thread::spawn(move || handle.cancel());
    assert!(canceller.join().unwrap());

    gate.wait();
    assert!(matches!(victim.wait(), Err(ExecError::Cancelled)));
}

#[test]
fn cancel_after_completion_has_no_effect() {
    let (executor, _recorder) = create_executor(Concurrency::Serial);
    let pending = executor.submit(|_c, _x| Ok(3)).unwrap();
    assert!(pending.wait_timeout(Duration::from_secs(5)).is_some());
    assert!(!pending.cancel());
    assert!(matches!(pending.try_get(), Some(Err(ExecError::OutcomeTaken))));
}

#[test]
fn on_complete_receives_cancellation() {
    let (executor, _recorder) = create_executor(Concurrency::Serial);
    let gate = Arc::new(Barrier::new(2));
    let g = Arc::clone(&gate);
    let _blocker = executor
        .submit(move |_c, _x| {
            g.wait();
            Ok(())
        })
        .unwrap();

    let victim = executor.submit(|_c, _x| Ok(1)).unwrap();
    let handle = victim.cancel_handle();
    let (tx, rx) = mpsc::channel();
    victim.on_complete(move |outcome| {
        tx.send(outcome.map_err(|e| e.is_cancelled())).unwrap();
    });

    assert!(handle.cancel());
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Err(true));
    gate.wait();
}

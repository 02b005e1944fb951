//! Transaction Tests
//!
//! Each task runs in exactly one transaction on exactly one connection.

use crate::common::*;
use sqlexec::{Concurrency, ExecError, SqlTask, ExecutionContext, TxnOp};
use std::sync::atomic::Ordering;

// ============================================================================
// Outcomes
// ============================================================================

#[test]
fn value_task_commits_once() {
    let (executor, recorder) = create_executor(Concurrency::Serial);

    let pending = executor.submit(|_conn, _ctx| Ok(42)).unwrap();
    assert_eq!(pending.wait().unwrap(), 42);

    assert_eq!(
        recorder.events(),
        vec![
            Event::Acquire(0),
            Event::Begin(0),
            Event::Commit(0),
            Event::Release(0),
        ]
    );
}

#[test]
fn failing_task_rolls_back_once() {
    let (executor, recorder) = create_executor(Concurrency::Serial);

    let result = executor
        .submit(|_conn, _ctx| -> anyhow::Result<i32> { anyhow::bail!("X") })
        .unwrap()
        .wait();

    match result {
        Err(ExecError::Task { source, rollback }) => {
            assert_eq!(source.to_string(), "X");
            assert!(rollback.is_none());
        }
        other => panic!("Expected task failure, got {:?}", other),
    }
    assert_eq!(recorder.rollbacks(), 1);
    assert_eq!(recorder.commits(), 0);
    assert_eq!(recorder.releases(), 1);
}

#[test]
fn rollback_failure_is_secondary_cause() {
    let (executor, recorder) = create_executor(Concurrency::Serial);
    recorder.fail_rollback.store(true, Ordering::SeqCst);

    let err = executor
        .submit(|_conn, _ctx| -> anyhow::Result<()> { anyhow::bail!("X") })
        .unwrap()
        .wait()
        .unwrap_err();

    assert_eq!(err.task_error().unwrap().to_string(), "X");
    assert_eq!(err.rollback_error().unwrap().op, TxnOp::Rollback);
    assert!(err.to_string().contains("rollback also failed"));
    assert_eq!(recorder.releases(), 1);
}

#[test]
fn commit_failure_rolls_back() {
    let (executor, recorder) = create_executor(Concurrency::Serial);
    recorder.fail_commit.store(true, Ordering::SeqCst);

    let err = executor.submit(|_conn, _ctx| Ok(1)).unwrap().wait().unwrap_err();

    assert!(matches!(err, ExecError::Commit(ref e) if e.op == TxnOp::Commit));
    assert_eq!(recorder.commits(), 1);
    assert_eq!(recorder.rollbacks(), 1);
    assert_eq!(recorder.releases(), 1);
}

#[test]
fn begin_failure_skips_body() {
    let (executor, recorder) = create_executor(Concurrency::Serial);
    recorder.fail_begin.store(true, Ordering::SeqCst);

    let err = executor
        .submit(|_conn, _ctx| -> anyhow::Result<()> { panic!("body must not run") })
        .unwrap()
        .wait()
        .unwrap_err();

    assert!(matches!(err, ExecError::Begin(_)));
    assert_eq!(recorder.commits() + recorder.rollbacks(), 0);
    assert_eq!(recorder.releases(), 1);
}

#[test]
fn acquisition_failure_resolves_result() {
    let (executor, recorder) = create_executor(Concurrency::Serial);
    recorder.fail_acquire.store(true, Ordering::SeqCst);

    let err = executor.submit(|_conn, _ctx| Ok(())).unwrap().wait().unwrap_err();

    assert!(matches!(err, ExecError::Acquisition(_)));
    assert_eq!(recorder.begins(), 0);
    assert_eq!(recorder.releases(), 0);

    // The source recovers; the executor keeps serving
    recorder.fail_acquire.store(false, Ordering::SeqCst);
    assert_eq!(executor.submit(|_c, _x| Ok(7)).unwrap().wait().unwrap(), 7);
}

#[test]
fn panicking_task_rolls_back_and_worker_survives() {
    let (executor, recorder) = create_executor(Concurrency::Serial);

    let err = executor
        .submit(|_conn, _ctx| -> anyhow::Result<()> { panic!("kaboom") })
        .unwrap()
        .wait()
        .unwrap_err();
    match err {
        ExecError::Panicked { message, rollback } => {
            assert_eq!(message, "kaboom");
            assert!(rollback.is_none());
        }
        other => panic!("Expected panic outcome, got {:?}", other),
    }
    assert_eq!(recorder.rollbacks(), 1);
    assert_eq!(recorder.releases(), 1);

    assert_eq!(executor.submit(|_c, _x| Ok("alive")).unwrap().wait().unwrap(), "alive");
    assert_eq!(executor.stats().workers, 1);
}

// ============================================================================
// Connection Handling
// ============================================================================

#[test]
fn every_path_releases_exactly_once() {
    let (executor, recorder) = create_executor(Concurrency::bounded(2).unwrap());

    let ok = executor.submit(|_c, _x| Ok(())).unwrap();
    let failed = executor
        .submit(|_c, _x| -> anyhow::Result<()> { anyhow::bail!("no") })
        .unwrap();
    let panicked = executor
        .submit(|_c, _x| -> anyhow::Result<()> { panic!("no") })
        .unwrap();

    assert!(ok.wait().is_ok());
    assert!(failed.wait().is_err());
    assert!(panicked.wait().is_err());

    assert_eq!(recorder.acquires(), 3);
    assert_eq!(recorder.releases(), 3);
    for id in 0..3 {
        assert_eq!(recorder.count(|e| *e == Event::Release(id)), 1);
    }
}

#[test]
fn task_sees_its_own_connection() {
    let (executor, _recorder) = create_executor(Concurrency::bounded(4).unwrap());

    let pending: Vec<_> = (0..8)
        .map(|_| executor.submit(|conn, _ctx| Ok(conn.id)).unwrap())
        .collect();
    let mut ids: Vec<usize> = pending.into_iter().map(|p| p.wait().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 8, "each task gets a distinct connection");
}

// ============================================================================
// Named Tasks
// ============================================================================

struct Doubler(u64);

impl SqlTask<MockConn> for Doubler {
    type Output = u64;

    fn execute(self, _conn: &mut MockConn, _ctx: &ExecutionContext) -> anyhow::Result<u64> {
        Ok(self.0 * 2)
    }
}

#[test]
fn submit_task_runs_named_task() {
    let (executor, recorder) = create_executor(Concurrency::Serial);
    let pending = executor.submit_task(Doubler(21)).unwrap();
    assert_eq!(pending.wait().unwrap(), 42);
    assert_eq!(recorder.commits(), 1);
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn stats_count_outcomes() {
    let (executor, _recorder) = create_executor(Concurrency::Serial);

    executor.submit(|_c, _x| Ok(())).unwrap().wait().unwrap();
    executor.submit(|_c, _x| Ok(())).unwrap().wait().unwrap();
    let _ = executor
        .submit(|_c, _x| -> anyhow::Result<()> { anyhow::bail!("bad") })
        .unwrap()
        .wait();
    executor.drain();

    let stats = executor.stats();
    assert_eq!(stats.committed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cancelled, 0);
    assert_eq!(stats.executed, 3);
    assert_eq!(stats.queued, 0);
}

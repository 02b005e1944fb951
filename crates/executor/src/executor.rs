//! The executor: runs submitted tasks inside transactions
//!
//! Each task gets its own connection from the source, a transaction around
//! its body, and a pending result that receives exactly one outcome.
//!
//! ## Per-task algorithm
//!
//! 1. Skip the task if it was cancelled while queued.
//! 2. Acquire a connection; an acquisition failure resolves the result.
//! 3. Mark the task running, begin, run the body.
//! 4. `Ok` commits, `Err` or panic rolls back. A rollback failure is
//!    attached to the body's error, never in place of it.
//! 5. Release the connection, then resolve the result.
//!
//! The connection is released before the result is resolved, so a caller
//! that has observed the outcome also observes the release.

use parking_lot::Mutex;
use sqlexec_core::{Connection, ConnectionSource};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::context::ExecutionContext;
use crate::error::{ExecError, ExecResult};
use crate::pending::{PendingResult, Shared};
use crate::pool::{Job, WorkerPool};
use crate::task::SqlTask;
use crate::types::{Concurrency, ExecutorState, ExecutorStats, ShutdownSummary};

struct Lifecycle<S> {
    state: ExecutorState,
    source: Option<Arc<S>>,
    pool: Option<Arc<WorkerPool>>,
    concurrency: Option<Concurrency>,
}

#[derive(Default)]
struct Counters {
    committed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Transactional task executor over a connection source.
///
/// # Lifecycle
///
/// `Uninitialized → Running → ShuttingDown → Terminated`. Tasks are only
/// accepted while `Running`; any other state rejects the submission with
/// [`ExecError::Rejected`].
///
/// The executor shares the source it is given but does not own it: shutdown
/// drops the executor's handle and never closes the source.
///
/// # Thread Safety
///
/// `SqlExecutor` is `Send + Sync`; submit from any number of threads.
///
/// # Example
///
/// ```ignore
/// let executor = SqlExecutor::new(ExecutorConfig::default());
/// executor.initialize(source, Concurrency::Serial)?;
///
/// let pending = executor.submit(|conn, _ctx| {
///     conn.execute("INSERT INTO t VALUES (1)", [])?;
///     Ok(42)
/// })?;
/// assert_eq!(pending.wait()?, 42);
///
/// executor.close();
/// ```
pub struct SqlExecutor<S: ConnectionSource> {
    config: ExecutorConfig,
    lifecycle: Mutex<Lifecycle<S>>,
    counters: Arc<Counters>,
    next_id: AtomicU64,
}

impl<S: ConnectionSource> SqlExecutor<S> {
    /// Create an uninitialized executor.
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            lifecycle: Mutex::new(Lifecycle {
                state: ExecutorState::Uninitialized,
                source: None,
                pool: None,
                concurrency: None,
            }),
            counters: Arc::new(Counters::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The configuration this executor was built with.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Bind the executor to `source` and start its workers.
    ///
    /// `Serial` and `Bounded` start every worker now. `Unbounded` starts
    /// workers on demand as submissions arrive.
    ///
    /// # Errors
    ///
    /// - [`ExecError::AlreadyInitialized`] unless the executor is uninitialized
    /// - [`ExecError::Spawn`] if a worker thread cannot be started; the
    ///   executor stays uninitialized
    pub fn initialize(&self, source: Arc<S>, concurrency: Concurrency) -> ExecResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != ExecutorState::Uninitialized {
            return Err(ExecError::AlreadyInitialized(lifecycle.state));
        }

        let prefix = &self.config.thread_name_prefix;
        let max_queue_depth = self.config.max_queue_depth;
        let pool = match concurrency.fixed_workers() {
            Some(workers) => WorkerPool::fixed(workers, prefix, max_queue_depth)?,
            None => WorkerPool::elastic(self.config.idle_keep_alive(), prefix, max_queue_depth),
        };

        lifecycle.state = ExecutorState::Running;
        lifecycle.source = Some(source);
        lifecycle.pool = Some(Arc::new(pool));
        lifecycle.concurrency = Some(concurrency);
        info!(target: "sqlexec::executor", %concurrency, "Executor initialized");
        Ok(())
    }

    /// Initialize with the concurrency named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Config`] if the configured concurrency does not
    /// parse, otherwise the errors of [`initialize`](Self::initialize).
    pub fn initialize_with_config(&self, source: Arc<S>) -> ExecResult<()> {
        let concurrency = self.config.concurrency()?;
        self.initialize(source, concurrency)
    }

    /// Queue `task` for execution inside a transaction.
    ///
    /// The body receives the task's connection and its execution context.
    /// Returning `Ok(value)` commits and resolves the result with `value`;
    /// returning `Err` or panicking rolls back and resolves it with the
    /// failure.
    ///
    /// # Errors
    ///
    /// - [`ExecError::Rejected`] if the executor is not running
    /// - [`ExecError::QueueFull`] if the configured queue bound is reached
    /// - [`ExecError::Spawn`] if an unbounded executor cannot start a worker
    pub fn submit<T, F>(&self, task: F) -> ExecResult<PendingResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut S::Connection, &ExecutionContext) -> anyhow::Result<T> + Send + 'static,
    {
        let lifecycle = self.lifecycle.lock();
        let (source, pool) = match (&lifecycle.source, &lifecycle.pool) {
            (Some(source), Some(pool)) if lifecycle.state == ExecutorState::Running => {
                (Arc::clone(source), Arc::clone(pool))
            }
            _ => {
                Counters::bump(&self.counters.rejected);
                debug!(target: "sqlexec::executor", state = %lifecycle.state, "Submission rejected");
                return Err(ExecError::Rejected(lifecycle.state));
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Shared::<T>::new();
        let pending = PendingResult::new(id, Arc::clone(&shared));
        let ctx = pending.context();
        let counters = Arc::clone(&self.counters);

        let job = Job {
            id,
            control: pending.control(),
            work: Box::new(move || run_task(id, &*source, &shared, &ctx, task, &counters)),
        };

        // Still under the lifecycle lock: shutdown cannot slip in between
        // the state check and the enqueue.
        if let Err((_job, err)) = pool.submit(job) {
            Counters::bump(&self.counters.rejected);
            debug!(target: "sqlexec::executor", task_id = id, error = %err, "Submission rejected by pool");
            return Err(err);
        }
        drop(lifecycle);

        debug!(target: "sqlexec::executor", task_id = id, "Task submitted");
        Ok(pending)
    }

    /// Queue a [`SqlTask`] for execution.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_task<K>(&self, task: K) -> ExecResult<PendingResult<K::Output>>
    where
        K: SqlTask<S::Connection>,
    {
        self.submit(move |conn, ctx| task.execute(conn, ctx))
    }

    /// Stop accepting tasks and wait up to `grace` for outstanding ones.
    ///
    /// Queued tasks still run during the grace period. When it elapses,
    /// queued tasks are resolved as cancelled without running and running
    /// tasks are resolved as cancelled; a running body that later returns
    /// `Ok` is rolled back rather than committed.
    ///
    /// Idempotent: later calls return an empty summary. Shutting down an
    /// uninitialized executor moves it straight to `Terminated`.
    pub fn shutdown(&self, grace: Duration) -> ShutdownSummary {
        let pool = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                ExecutorState::Running => {
                    lifecycle.state = ExecutorState::ShuttingDown;
                    lifecycle.pool.clone()
                }
                ExecutorState::Uninitialized => {
                    lifecycle.state = ExecutorState::Terminated;
                    debug!(target: "sqlexec::executor", "Uninitialized executor terminated");
                    return ShutdownSummary::default();
                }
                ExecutorState::ShuttingDown | ExecutorState::Terminated => {
                    return ShutdownSummary::default();
                }
            }
        };

        let grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        info!(target: "sqlexec::executor", grace_ms, "Executor shutting down");
        let mut summary = ShutdownSummary::default();
        if let Some(pool) = pool {
            pool.shutdown();
            if !pool.await_termination(grace) {
                let counts = pool.abort();
                // Running tasks are counted by their worker once the body returns
                self.counters.cancelled.fetch_add(
                    (counts.cancelled_queued + counts.dropped_cancelled) as u64,
                    Ordering::Relaxed,
                );
                let (cancelled_queued, cancelled_running) =
                    (counts.cancelled_queued, counts.cancelled_running);
                summary = ShutdownSummary {
                    forced: true,
                    cancelled_queued,
                    cancelled_running,
                };
                warn!(
                    target: "sqlexec::executor",
                    cancelled_queued,
                    cancelled_running,
                    "Shutdown grace period elapsed, outstanding tasks cancelled"
                );
            }
        }

        let mut lifecycle = self.lifecycle.lock();
        lifecycle.state = ExecutorState::Terminated;
        lifecycle.pool = None;
        lifecycle.source = None;
        info!(target: "sqlexec::executor", forced = summary.forced, "Executor terminated");
        summary
    }

    /// Shut down with the configured grace period.
    pub fn close(&self) -> ShutdownSummary {
        self.shutdown(self.config.shutdown_grace())
    }

    /// Block until every task submitted so far has finished.
    ///
    /// Returns immediately if the executor is not running.
    pub fn drain(&self) {
        let pool = self.lifecycle.lock().pool.clone();
        if let Some(pool) = pool {
            pool.drain();
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutorState {
        self.lifecycle.lock().state
    }

    /// Concurrency bound, once initialized.
    pub fn concurrency(&self) -> Option<Concurrency> {
        self.lifecycle.lock().concurrency
    }

    /// Snapshot of queue depth, worker count and outcome counters.
    pub fn stats(&self) -> ExecutorStats {
        let (state, pool) = {
            let lifecycle = self.lifecycle.lock();
            (lifecycle.state, lifecycle.pool.clone())
        };
        let pool_stats = pool.map(|pool| pool.stats());
        ExecutorStats {
            state,
            queued: pool_stats.map_or(0, |s| s.queued),
            active: pool_stats.map_or(0, |s| s.active),
            workers: pool_stats.map_or(0, |s| s.workers),
            executed: pool_stats.map_or(0, |s| s.jobs_completed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

impl<S: ConnectionSource> Drop for SqlExecutor<S> {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().state == ExecutorState::Running {
            self.close();
        }
    }
}

// ============================================================================
// Worker side
// ============================================================================

fn run_task<S, T, F>(
    id: u64,
    source: &S,
    shared: &Shared<T>,
    ctx: &ExecutionContext,
    task: F,
    counters: &Counters,
) where
    S: ConnectionSource,
    T: Send + 'static,
    F: FnOnce(&mut S::Connection, &ExecutionContext) -> anyhow::Result<T>,
{
    if shared.is_resolved() {
        debug!(target: "sqlexec::worker", task_id = id, "Skipping cancelled task");
        settle(id, shared, counters, Err(ExecError::Cancelled));
        return;
    }

    let mut conn = match source.acquire() {
        Ok(conn) => conn,
        Err(e) => {
            warn!(target: "sqlexec::worker", task_id = id, error = %e, "Connection acquisition failed");
            settle(id, shared, counters, Err(ExecError::Acquisition(e)));
            return;
        }
    };

    // Contain panics from the driver's transaction calls too, so the
    // connection is handed back on every path.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        transact(id, &mut conn, shared, ctx, task)
    }))
    .unwrap_or_else(|payload| {
        Err(ExecError::Panicked {
            message: panic_message(payload.as_ref()),
            rollback: None,
        })
    });

    source.release(conn);
    settle(id, shared, counters, outcome);
}

fn transact<C, T, F>(
    id: u64,
    conn: &mut C,
    shared: &Shared<T>,
    ctx: &ExecutionContext,
    task: F,
) -> ExecResult<T>
where
    C: Connection,
    T: Send + 'static,
    F: FnOnce(&mut C, &ExecutionContext) -> anyhow::Result<T>,
{
    // Cancelled between the queue and here
    if !shared.try_start() {
        return Err(ExecError::Cancelled);
    }

    conn.begin().map_err(ExecError::Begin)?;
    debug!(target: "sqlexec::worker", task_id = id, "Transaction started");

    let body = panic::catch_unwind(AssertUnwindSafe(|| task(&mut *conn, ctx)));
    match body {
        Ok(Ok(value)) => {
            if !shared.begin_finish() {
                // Resolved as cancelled by shutdown while the body ran
                rollback_logged(id, conn);
                return Err(ExecError::Cancelled);
            }
            match conn.commit() {
                Ok(()) => {
                    debug!(target: "sqlexec::worker", task_id = id, "Transaction committed");
                    Ok(value)
                }
                Err(e) => {
                    warn!(target: "sqlexec::worker", task_id = id, error = %e, "Commit failed");
                    rollback_logged(id, conn);
                    Err(ExecError::Commit(e))
                }
            }
        }
        Ok(Err(source)) => {
            debug!(target: "sqlexec::worker", task_id = id, error = %source, "Task failed, rolling back");
            Err(ExecError::Task {
                source,
                rollback: rollback_logged(id, conn),
            })
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(target: "sqlexec::worker", task_id = id, %message, "Task panicked, rolling back");
            Err(ExecError::Panicked {
                message,
                rollback: rollback_logged(id, conn),
            })
        }
    }
}

fn rollback_logged<C: Connection>(id: u64, conn: &mut C) -> Option<sqlexec_core::ConnectionError> {
    match conn.rollback() {
        Ok(()) => None,
        Err(e) => {
            warn!(target: "sqlexec::worker", task_id = id, error = %e, "Rollback failed");
            Some(e)
        }
    }
}

fn settle<T: Send + 'static>(id: u64, shared: &Shared<T>, counters: &Counters, outcome: ExecResult<T>) {
    let counter = match &outcome {
        Ok(_) => &counters.committed,
        Err(ExecError::Cancelled) => &counters.cancelled,
        Err(_) => &counters.failed,
    };
    if shared.resolve(outcome) {
        Counters::bump(counter);
    } else {
        // Already resolved by a cancellation
        debug!(target: "sqlexec::worker", task_id = id, "Outcome discarded, task was cancelled");
        Counters::bump(&counters.cancelled);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "(non-string panic)".to_string()
    }
}

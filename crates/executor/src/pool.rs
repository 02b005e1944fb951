//! Worker pool behind the executor.
//!
//! A FIFO job queue served by worker threads. Fixed pools start all their
//! workers up front and keep them until shutdown. Elastic pools start a
//! worker whenever a job arrives and no idle worker is left to take it;
//! idle elastic workers retire after the keep-alive period.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::context::Cancellable;
use crate::error::{ExecError, ExecResult};
use crate::types::ExecutorState;

/// A unit of pool work: the wrapped task plus its cancellation control.
pub(crate) struct Job {
    pub(crate) id: u64,
    pub(crate) control: Arc<dyn Cancellable>,
    pub(crate) work: Box<dyn FnOnce() + Send>,
}

/// Pool metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolStats {
    pub(crate) queued: usize,
    pub(crate) active: usize,
    pub(crate) workers: usize,
    pub(crate) jobs_completed: u64,
}

/// What [`WorkerPool::abort`] did to the jobs it found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AbortCounts {
    /// Queued jobs this call resolved as cancelled
    pub(crate) cancelled_queued: usize,
    /// Running jobs this call resolved as cancelled
    pub(crate) cancelled_running: usize,
    /// Queued jobs removed that were already cancelled by their caller
    pub(crate) dropped_cancelled: usize,
}

struct PoolState {
    queue: VecDeque<Job>,
    running: HashMap<u64, Arc<dyn Cancellable>>,
    idle_workers: usize,
    live_workers: usize,
    shutdown: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    work_ready: Condvar,
    drain_cond: Condvar,
    terminated: Condvar,
    jobs_completed: AtomicU64,
    next_worker_index: AtomicUsize,
    keep_alive: Option<Duration>,
    max_queue_depth: Option<usize>,
    thread_name_prefix: String,
}

pub(crate) struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    elastic: bool,
}

impl WorkerPool {
    /// Start a pool of exactly `num_threads` workers.
    ///
    /// Workers are named `{prefix}-0`, `{prefix}-1`, etc.
    pub(crate) fn fixed(
        num_threads: usize,
        thread_name_prefix: &str,
        max_queue_depth: Option<usize>,
    ) -> ExecResult<Self> {
        let pool = Self::empty(false, None, thread_name_prefix, max_queue_depth);
        for _ in 0..num_threads {
            let mut state = pool.inner.state.lock();
            if let Err(e) = pool.spawn_worker(&mut state) {
                drop(state);
                pool.shutdown();
                return Err(ExecError::Spawn(e));
            }
        }
        Ok(pool)
    }

    /// Create a pool that grows a worker per submission when none is idle.
    pub(crate) fn elastic(
        keep_alive: Duration,
        thread_name_prefix: &str,
        max_queue_depth: Option<usize>,
    ) -> Self {
        Self::empty(true, Some(keep_alive), thread_name_prefix, max_queue_depth)
    }

    fn empty(
        elastic: bool,
        keep_alive: Option<Duration>,
        thread_name_prefix: &str,
        max_queue_depth: Option<usize>,
    ) -> Self {
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                running: HashMap::new(),
                idle_workers: 0,
                live_workers: 0,
                shutdown: false,
            }),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            terminated: Condvar::new(),
            jobs_completed: AtomicU64::new(0),
            next_worker_index: AtomicUsize::new(0),
            keep_alive,
            max_queue_depth,
            thread_name_prefix: thread_name_prefix.to_string(),
        });
        Self {
            inner,
            workers: Mutex::new(Vec::new()),
            elastic,
        }
    }

    // Called with the state lock held so live_workers is exact.
    fn spawn_worker(&self, state: &mut PoolState) -> io::Result<()> {
        let mut workers = self.workers.lock();
        workers.retain(|handle| !handle.is_finished());

        let index = self
            .inner
            .next_worker_index
            .fetch_add(1, AtomicOrdering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name(format!("{}-{}", self.inner.thread_name_prefix, index))
            .spawn(move || worker_loop(&inner))?;
        state.live_workers += 1;
        workers.push(handle);
        Ok(())
    }

    /// Queue a job.
    ///
    /// Returns the job back on rejection so the caller can resolve it.
    pub(crate) fn submit(&self, job: Job) -> Result<(), (Job, ExecError)> {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return Err((job, ExecError::Rejected(ExecutorState::ShuttingDown)));
        }
        if let Some(max_queue_depth) = self.inner.max_queue_depth {
            if state.queue.len() >= max_queue_depth {
                return Err((job, ExecError::QueueFull { max_queue_depth }));
            }
        }

        // Every queued job needs an idle worker to claim it
        if self.elastic && state.queue.len() >= state.idle_workers {
            if let Err(e) = self.spawn_worker(&mut state) {
                return Err((job, ExecError::Spawn(e)));
            }
        }

        state.queue.push_back(job);
        drop(state);
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until all queued and in-flight jobs have completed.
    ///
    /// Workers remain running after drain completes.
    pub(crate) fn drain(&self) {
        let mut state = self.inner.state.lock();
        while !state.queue.is_empty() || !state.running.is_empty() {
            self.inner.drain_cond.wait(&mut state);
        }
    }

    /// Stop taking jobs. Workers finish the queue and exit.
    pub(crate) fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        // Notify under the lock: a worker between its shutdown check and
        // condvar wait holds the lock, so it either sees the flag or gets
        // the wakeup.
        self.inner.work_ready.notify_all();
    }

    /// Wait up to `timeout` for every worker to exit, then join them.
    ///
    /// A timeout too large to express as a deadline waits without bound.
    /// Returns false if workers are still alive when the timeout elapses.
    pub(crate) fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        {
            let mut state = self.inner.state.lock();
            while state.live_workers > 0 {
                match deadline {
                    Some(deadline) => {
                        let timed_out = self
                            .inner
                            .terminated
                            .wait_until(&mut state, deadline)
                            .timed_out();
                        if timed_out && state.live_workers > 0 {
                            return false;
                        }
                    }
                    None => self.inner.terminated.wait(&mut state),
                }
            }
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        true
    }

    /// Cancel everything still pending.
    ///
    /// Queued jobs are removed and resolved as cancelled without running.
    /// Running jobs have their results resolved as cancelled; their threads
    /// are left to finish the task body and exit.
    pub(crate) fn abort(&self) -> AbortCounts {
        let (queued, running): (Vec<Job>, Vec<Arc<dyn Cancellable>>) = {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            self.inner.work_ready.notify_all();
            (
                state.queue.drain(..).collect(),
                state.running.values().cloned().collect(),
            )
        };

        let mut counts = AbortCounts::default();
        for job in queued {
            debug!(target: "sqlexec::worker", task_id = job.id, "Queued task cancelled at shutdown");
            if job.control.force_cancel() {
                counts.cancelled_queued += 1;
            } else if job.control.is_cancel_requested() {
                // Cancelled by its caller while queued; no worker will see it
                counts.dropped_cancelled += 1;
            }
        }
        counts.cancelled_running = running.iter().filter(|c| c.force_cancel()).count();

        // Detach: threads still inside a task body exit once it returns
        self.workers.lock().clear();

        let state = self.inner.state.lock();
        if state.running.is_empty() {
            self.inner.drain_cond.notify_all();
        }
        counts
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            queued: state.queue.len(),
            active: state.running.len(),
            workers: state.live_workers,
            jobs_completed: self.inner.jobs_completed.load(AtomicOrdering::Relaxed),
        }
    }
}

/// RAII guard that clears a job from the running set and notifies drain
/// waiters on drop, even if the job panics.
struct RunningGuard<'a> {
    inner: &'a PoolInner,
    id: u64,
}

impl<'a> Drop for RunningGuard<'a> {
    fn drop(&mut self) {
        self.inner
            .jobs_completed
            .fetch_add(1, AtomicOrdering::Relaxed);

        let mut state = self.inner.state.lock();
        state.running.remove(&self.id);
        if state.running.is_empty() && state.queue.is_empty() {
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut state = inner.state.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.running.insert(job.id, Arc::clone(&job.control));
                    break job;
                }
                if state.shutdown {
                    retire(inner, &mut state);
                    return;
                }

                state.idle_workers += 1;
                let timed_out = match inner.keep_alive {
                    Some(keep_alive) => inner.work_ready.wait_for(&mut state, keep_alive).timed_out(),
                    None => {
                        inner.work_ready.wait(&mut state);
                        false
                    }
                };
                state.idle_workers -= 1;

                if timed_out && state.queue.is_empty() {
                    retire(inner, &mut state);
                    return;
                }
            }
        };

        let _guard = RunningGuard { inner, id: job.id };

        // The executor's job wrapper already captures task panics; this is
        // the last line that keeps the worker thread alive.
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job.work)) {
            error!(
                target: "sqlexec::worker",
                task_id = job.id,
                "worker job panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}

fn retire(inner: &PoolInner, state: &mut PoolState) {
    state.live_workers -= 1;
    if state.live_workers == 0 {
        inner.terminated.notify_all();
    }
}

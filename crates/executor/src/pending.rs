//! Write-once pending result of a submitted task
//!
//! A [`PendingResult`] is the caller's read side; the worker that runs the
//! task holds the write side. The outcome is written exactly once: by the
//! worker, by a cancellation that wins the race against execution start, or
//! by forced cancellation at shutdown. Later writes are ignored.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::{CancelHandle, Cancellable, ExecutionContext};
use crate::error::{ExecError, ExecResult};
use crate::executor::panic_message;
use tracing::error;

type Callback<T> = Box<dyn FnOnce(ExecResult<T>) + Send>;

enum Phase<T> {
    /// Submitted, not yet picked up by a worker
    Queued,
    /// A worker has started the task; cancel only raises the flag
    Running,
    /// The body returned `Ok` and the worker is committing; forced
    /// cancellation can no longer resolve the task
    Finishing,
    /// Outcome written, waiting to be read
    Resolved(ExecResult<T>),
    /// Outcome handed to the caller
    Taken,
}

impl<T> Phase<T> {
    fn is_resolved(&self) -> bool {
        matches!(self, Phase::Resolved(_) | Phase::Taken)
    }
}

struct Slot<T> {
    phase: Phase<T>,
    callback: Option<Callback<T>>,
}

/// State shared between a `PendingResult` and the worker running its task.
pub(crate) struct Shared<T> {
    slot: Mutex<Slot<T>>,
    resolved: Condvar,
    cancel_requested: AtomicBool,
}

impl<T: Send + 'static> Shared<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                phase: Phase::Queued,
                callback: None,
            }),
            resolved: Condvar::new(),
            cancel_requested: AtomicBool::new(false),
        })
    }

    /// Move from queued to running. Returns false if the task was already
    /// resolved (cancelled) and must not run.
    pub(crate) fn try_start(&self) -> bool {
        let mut slot = self.slot.lock();
        match slot.phase {
            Phase::Queued => {
                slot.phase = Phase::Running;
                true
            }
            _ => false,
        }
    }

    /// Claim the right to commit. Returns false if forced cancellation
    /// resolved the task while its body was running.
    pub(crate) fn begin_finish(&self) -> bool {
        let mut slot = self.slot.lock();
        match slot.phase {
            Phase::Running => {
                slot.phase = Phase::Finishing;
                true
            }
            _ => false,
        }
    }

    /// Whether the outcome has already been written.
    pub(crate) fn is_resolved(&self) -> bool {
        self.slot.lock().phase.is_resolved()
    }

    /// Write the outcome. Returns false if it was already written.
    pub(crate) fn resolve(&self, outcome: ExecResult<T>) -> bool {
        let callback = {
            let mut slot = self.slot.lock();
            if slot.phase.is_resolved() {
                return false;
            }
            match slot.callback.take() {
                Some(callback) => {
                    slot.phase = Phase::Taken;
                    Some((callback, outcome))
                }
                None => {
                    slot.phase = Phase::Resolved(outcome);
                    self.resolved.notify_all();
                    None
                }
            }
        };

        // Run outside the lock so the callback may touch the executor
        if let Some((callback, outcome)) = callback {
            run_callback(callback, outcome);
        }
        true
    }

    fn take_locked(slot: &mut Slot<T>) -> Option<ExecResult<T>> {
        match std::mem::replace(&mut slot.phase, Phase::Taken) {
            Phase::Resolved(outcome) => Some(outcome),
            Phase::Taken => Some(Err(ExecError::OutcomeTaken)),
            pending => {
                slot.phase = pending;
                None
            }
        }
    }
}

impl<T: Send + 'static> Cancellable for Shared<T> {
    fn cancel(&self) -> bool {
        self.cancel_requested.store(true, Ordering::Release);
        self.resolve_cancelled_when(|phase| matches!(phase, Phase::Queued))
    }

    fn force_cancel(&self) -> bool {
        self.cancel_requested.store(true, Ordering::Release);
        self.resolve_cancelled_when(|phase| matches!(phase, Phase::Queued | Phase::Running))
    }

    fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> Shared<T> {
    fn resolve_cancelled_when(&self, allowed: impl Fn(&Phase<T>) -> bool) -> bool {
        let callback = {
            let mut slot = self.slot.lock();
            if !allowed(&slot.phase) {
                return false;
            }
            match slot.callback.take() {
                Some(callback) => {
                    slot.phase = Phase::Taken;
                    Some(callback)
                }
                None => {
                    slot.phase = Phase::Resolved(Err(ExecError::Cancelled));
                    self.resolved.notify_all();
                    None
                }
            }
        };

        if let Some(callback) = callback {
            run_callback(callback, Err(ExecError::Cancelled));
        }
        true
    }
}

/// Invoke a completion callback on the resolving thread, containing panics.
///
/// The resolving thread may be a worker or the thread running `shutdown`;
/// neither may be unwound by caller code.
fn run_callback<T>(callback: Callback<T>, outcome: ExecResult<T>) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
        error!(
            target: "sqlexec::worker",
            message = %panic_message(payload.as_ref()),
            "Completion callback panicked"
        );
    }
}

/// The eventual outcome of one submitted task.
///
/// The outcome can be read once: [`wait`](Self::wait),
/// [`wait_timeout`](Self::wait_timeout), [`try_get`](Self::try_get) and
/// [`on_complete`](Self::on_complete) all hand it over, and any later read
/// yields [`ExecError::OutcomeTaken`].
pub struct PendingResult<T> {
    id: u64,
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> PendingResult<T> {
    pub(crate) fn new(id: u64, shared: Arc<Shared<T>>) -> Self {
        Self { id, shared }
    }

    /// Executor-assigned task id, as it appears in logs.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the task resolves.
    pub fn wait(self) -> ExecResult<T> {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = Shared::take_locked(&mut slot) {
                return outcome;
            }
            self.shared.resolved.wait(&mut slot);
        }
    }

    /// Block for at most `timeout`. Returns `None` if the task has not
    /// resolved by then. A timeout too large to express as a deadline waits
    /// without bound.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExecResult<T>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = Shared::take_locked(&mut slot) {
                return Some(outcome);
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .resolved
                        .wait_until(&mut slot, deadline)
                        .timed_out()
                    {
                        return Shared::take_locked(&mut slot);
                    }
                }
                None => self.shared.resolved.wait(&mut slot),
            }
        }
    }

    /// Non-blocking poll. Returns `None` while the task is unresolved.
    pub fn try_get(&self) -> Option<ExecResult<T>> {
        Shared::take_locked(&mut self.shared.slot.lock())
    }

    /// Whether the outcome has been written.
    pub fn is_done(&self) -> bool {
        self.shared.is_resolved()
    }

    /// Run `callback` with the outcome once it is written.
    ///
    /// If the task already resolved, the callback runs now on the calling
    /// thread; otherwise it runs on the thread that resolves the task
    /// (normally a worker), so it must not block on the same serial
    /// executor.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(ExecResult<T>) + Send + 'static,
    {
        let ready = {
            let mut slot = self.shared.slot.lock();
            match Shared::take_locked(&mut slot) {
                Some(outcome) => Some(outcome),
                None => {
                    slot.callback = Some(Box::new(callback));
                    return;
                }
            }
        };
        if let Some(outcome) = ready {
            callback(outcome);
        }
    }

    /// Request cancellation.
    ///
    /// Returns true if the task had not started: its body will never run and
    /// the outcome is [`ExecError::Cancelled`]. Once the task is running this
    /// only raises the flag its [`ExecutionContext`] reports, and returns
    /// false.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancel_requested()
    }

    /// A cloneable handle for cancelling from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.control())
    }

    pub(crate) fn control(&self) -> Arc<dyn Cancellable> {
        Arc::clone(&self.shared) as Arc<dyn Cancellable>
    }

    pub(crate) fn context(&self) -> ExecutionContext {
        ExecutionContext::new(self.control())
    }
}

impl<T> fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.shared.slot.lock().phase {
            Phase::Queued => "queued",
            Phase::Running => "running",
            Phase::Finishing => "finishing",
            Phase::Resolved(_) => "resolved",
            Phase::Taken => "taken",
        };
        f.debug_struct("PendingResult")
            .field("id", &self.id)
            .field("phase", &phase)
            .finish()
    }
}

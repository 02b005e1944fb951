//! Cooperative cancellation seen from both sides of a task
//!
//! [`ExecutionContext`] is what a running task body sees: a read-only
//! "has someone asked me to stop" flag. [`CancelHandle`] is the caller's side:
//! a cloneable way to request cancellation while another thread waits.

use std::fmt;
use std::sync::Arc;

/// Type-erased cancellation control over one submitted task.
///
/// Implemented by the pending-result slot so the pool and the context can
/// reach it without knowing the task's output type.
pub(crate) trait Cancellable: Send + Sync {
    /// Request cancellation. Returns true if the task was prevented from
    /// starting.
    fn cancel(&self) -> bool;

    /// Resolve the task as cancelled whether or not it has started. Used when
    /// the shutdown grace period runs out. Returns true if this resolved it.
    fn force_cancel(&self) -> bool;

    /// Whether cancellation has been requested.
    fn is_cancel_requested(&self) -> bool;
}

/// Passed to every task body; exposes only the cancellation flag.
///
/// A task that runs long should check [`is_cancelled`](Self::is_cancelled)
/// between statements and return early. Returning `Ok` after the flag is set
/// still commits.
#[derive(Clone)]
pub struct ExecutionContext {
    control: Arc<dyn Cancellable>,
}

impl ExecutionContext {
    pub(crate) fn new(control: Arc<dyn Cancellable>) -> Self {
        Self { control }
    }

    /// Whether cancellation of this task has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancel_requested()
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cloneable handle that can cancel one pending task from any thread.
#[derive(Clone)]
pub struct CancelHandle {
    control: Arc<dyn Cancellable>,
}

impl CancelHandle {
    pub(crate) fn new(control: Arc<dyn Cancellable>) -> Self {
        Self { control }
    }

    /// Request cancellation.
    ///
    /// Returns true if the task had not started and will never run. Once the
    /// task is running this only raises the cooperative flag and returns
    /// false.
    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancel_requested()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

//! Executor value types: lifecycle state, concurrency bound, statistics.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use crate::error::ExecError;

/// Executor lifecycle.
///
/// `Uninitialized → Running → ShuttingDown → Terminated`. Submissions are
/// only accepted while `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorState {
    /// Constructed, `initialize` not yet called
    Uninitialized,
    /// Accepting and executing tasks
    Running,
    /// No longer accepting tasks; waiting for in-flight work
    ShuttingDown,
    /// All tasks resolved and worker resources released
    Terminated,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorState::Uninitialized => "uninitialized",
            ExecutorState::Running => "running",
            ExecutorState::ShuttingDown => "shutting down",
            ExecutorState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How many tasks may execute at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concurrency {
    /// One worker; tasks run strictly in submission order
    Serial,
    /// A fixed pool of N workers
    Bounded(NonZeroUsize),
    /// A worker per submission when none is idle; idle workers retire after
    /// the configured keep-alive
    Unbounded,
}

impl Concurrency {
    /// Fixed pool of `workers` threads. `1` is the same as [`Serial`](Self::Serial).
    ///
    /// Returns `None` for zero.
    pub fn bounded(workers: usize) -> Option<Self> {
        match workers {
            0 => None,
            1 => Some(Concurrency::Serial),
            n => NonZeroUsize::new(n).map(Concurrency::Bounded),
        }
    }

    /// Number of workers started eagerly, or `None` for unbounded.
    pub fn fixed_workers(&self) -> Option<usize> {
        match self {
            Concurrency::Serial => Some(1),
            Concurrency::Bounded(n) => Some(n.get()),
            Concurrency::Unbounded => None,
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concurrency::Serial => f.write_str("serial"),
            Concurrency::Bounded(n) => write!(f, "{}", n),
            Concurrency::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl FromStr for Concurrency {
    type Err = ExecError;

    /// Parses `"serial"`, `"unbounded"`, or a positive worker count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "serial" => Ok(Concurrency::Serial),
            "unbounded" => Ok(Concurrency::Unbounded),
            other => other
                .parse::<usize>()
                .ok()
                .and_then(Concurrency::bounded)
                .ok_or_else(|| {
                    ExecError::config(format!(
                        "Invalid concurrency '{}'. Expected \"serial\", \"unbounded\" or a positive worker count.",
                        other
                    ))
                }),
        }
    }
}

/// Executor metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Lifecycle state at the time of the snapshot
    pub state: ExecutorState,
    /// Tasks waiting for a worker
    pub queued: usize,
    /// Tasks currently held by a worker
    pub active: usize,
    /// Live worker threads
    pub workers: usize,
    /// Jobs the worker pool has run to completion, whatever their outcome
    pub executed: u64,
    /// Tasks whose transaction committed
    pub committed: u64,
    /// Tasks resolved with a failure
    pub failed: u64,
    /// Tasks resolved as cancelled
    pub cancelled: u64,
    /// Submissions refused
    pub rejected: u64,
}

/// What a call to `shutdown` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownSummary {
    /// The grace period ran out and remaining tasks were cancelled
    pub forced: bool,
    /// Queued tasks cancelled without running
    pub cancelled_queued: usize,
    /// Running tasks whose results were resolved as cancelled
    pub cancelled_running: usize,
}

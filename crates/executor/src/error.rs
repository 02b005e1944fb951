//! Error types for task submission and execution.
//!
//! Every failure a caller can observe is an [`ExecError`]. Rejections are
//! returned by `submit`; everything that happens after submission is
//! delivered through the task's [`PendingResult`](crate::PendingResult).
//!
//! # Categories
//!
//! | Category | Variants | Description |
//! |----------|----------|-------------|
//! | Lifecycle | `Rejected`, `AlreadyInitialized`, `QueueFull`, `Spawn` | Executor not able to take the task |
//! | Connection | `Acquisition`, `Begin`, `Commit` | Connection source or transaction control failed |
//! | Task | `Task`, `Panicked` | The task body failed; rollback failure attached |
//! | Outcome | `Cancelled`, `OutcomeTaken` | No value will be produced |
//! | Config | `Config` | Executor configuration could not be loaded |

use sqlexec_core::{ConnectionError, SourceError};
use std::io;

use crate::types::ExecutorState;

/// Result type alias for executor operations
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Executor errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    // ==================== Lifecycle ====================
    /// Submission while the executor is not running
    #[error("submission rejected: executor is {0}")]
    Rejected(ExecutorState),

    /// `initialize` called on an executor that is not uninitialized
    #[error("executor already initialized (state: {0})")]
    AlreadyInitialized(ExecutorState),

    /// Queue is at its configured capacity
    #[error("executor queue is full ({max_queue_depth} tasks waiting)")]
    QueueFull {
        /// Configured queue bound
        max_queue_depth: usize,
    },

    /// A worker thread could not be started
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    // ==================== Connection ====================
    /// The connection source could not supply a connection
    #[error("failed to acquire connection: {0}")]
    Acquisition(#[source] SourceError),

    /// The transaction could not be started
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] ConnectionError),

    /// The task succeeded but its transaction did not commit
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] ConnectionError),

    // ==================== Task ====================
    /// The task body returned an error; the transaction was rolled back
    #[error("task failed: {source}{}", rollback_note(.rollback))]
    Task {
        /// The task's own error
        #[source]
        source: anyhow::Error,
        /// Rollback failure, if the rollback also failed
        rollback: Option<ConnectionError>,
    },

    /// The task body panicked; the transaction was rolled back
    #[error("task panicked: {message}{}", rollback_note(.rollback))]
    Panicked {
        /// Panic payload, if it was a string
        message: String,
        /// Rollback failure, if the rollback also failed
        rollback: Option<ConnectionError>,
    },

    // ==================== Outcome ====================
    /// The task was cancelled before it could produce a value
    #[error("task was cancelled")]
    Cancelled,

    /// The outcome was already read from this pending result
    #[error("outcome already taken from this pending result")]
    OutcomeTaken,

    // ==================== Config ====================
    /// Executor configuration is invalid or unreadable
    #[error("invalid executor configuration: {0}")]
    Config(String),
}

fn rollback_note(rollback: &Option<ConnectionError>) -> String {
    match rollback {
        Some(e) => format!(" (rollback also failed: {})", e),
        None => String::new(),
    }
}

impl ExecError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ExecError::Config(msg.into())
    }

    /// Whether this is a cancellation outcome
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled)
    }

    /// Whether the executor refused the submission
    pub fn is_rejected(&self) -> bool {
        matches!(self, ExecError::Rejected(_) | ExecError::QueueFull { .. })
    }

    /// Lifecycle misuse: submit before initialize or after shutdown, or
    /// initialize twice
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            ExecError::Rejected(_) | ExecError::AlreadyInitialized(_)
        )
    }

    /// The task body's own error, if the body failed
    pub fn task_error(&self) -> Option<&anyhow::Error> {
        match self {
            ExecError::Task { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Secondary rollback failure attached to a task failure
    pub fn rollback_error(&self) -> Option<&ConnectionError> {
        match self {
            ExecError::Task { rollback, .. } | ExecError::Panicked { rollback, .. } => {
                rollback.as_ref()
            }
            _ => None,
        }
    }
}

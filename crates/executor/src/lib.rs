//! # sqlexec executor
//!
//! Runs units of SQL work on worker threads, each inside its own
//! transaction on a connection borrowed from a [`ConnectionSource`].
//!
//! - [`SqlExecutor`] - lifecycle, submission and shutdown
//! - [`PendingResult`] - the write-once outcome of one task
//! - [`ExecutionContext`] - what a running task sees (its cancellation flag)
//! - [`ExecutorConfig`] - settings loaded from `sqlexec.toml`
//!
//! ## Quick Start
//!
//! ```text
//! use sqlexec_executor::{Concurrency, ExecutorConfig, SqlExecutor};
//!
//! let executor = SqlExecutor::new(ExecutorConfig::default());
//! executor.initialize(source, Concurrency::bounded(4).unwrap())?;
//!
//! let pending = executor.submit(|conn, ctx| {
//!     // Runs inside BEGIN ... COMMIT; an Err rolls back
//!     Ok(42)
//! })?;
//! assert_eq!(pending.wait()?, 42);
//!
//! executor.close();
//! ```
//!
//! ## Outcomes
//!
//! | Body result | Transaction | Pending result |
//! |-------------|-------------|----------------|
//! | `Ok(v)` | committed | `Ok(v)` |
//! | `Err(e)` | rolled back | `ExecError::Task` wrapping `e` |
//! | panic | rolled back | `ExecError::Panicked` |
//! | cancelled before start | never begun | `ExecError::Cancelled` |
//!
//! [`ConnectionSource`]: sqlexec_core::ConnectionSource

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod context;
mod error;
mod executor;
mod pending;
mod pool;
mod task;
mod types;

pub use config::{ExecutorConfig, CONFIG_FILE_NAME};
pub use context::{CancelHandle, ExecutionContext};
pub use error::{ExecError, ExecResult};
pub use executor::SqlExecutor;
pub use pending::PendingResult;
pub use task::SqlTask;
pub use types::{Concurrency, ExecutorState, ExecutorStats, ShutdownSummary};

//! sqlexec - connection-managed SQL task executor
//!
//! Units of work that need a database connection are submitted to a
//! [`SqlExecutor`]. Each one runs on a worker thread against a freshly
//! acquired connection, inside a transaction that commits when the task
//! returns `Ok` and rolls back when it fails.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlexec::{Concurrency, ExecutorConfig, SqlExecutor};
//!
//! let executor = SqlExecutor::new(ExecutorConfig::default());
//! executor.initialize(source, Concurrency::Serial)?;
//!
//! let pending = executor.submit(|conn, _ctx| {
//!     conn.execute("INSERT INTO notes (body) VALUES ('hello')")?;
//!     Ok(42)
//! })?;
//! assert_eq!(pending.wait()?, 42);
//!
//! executor.shutdown(std::time::Duration::from_secs(5));
//! ```
//!
//! # Architecture
//!
//! - `sqlexec-core`: the [`Connection`] and [`ConnectionSource`] seams,
//!   [`SourceConfig`] and the application-owned [`SourceRegistry`].
//! - `sqlexec-executor`: the executor, its worker pool and [`PendingResult`].
//! - `sqlexec-sqlite` (feature `sqlite`): a rusqlite-backed connection source.

pub use sqlexec_core::*;
pub use sqlexec_executor::*;

#[cfg(feature = "sqlite")]
pub use sqlexec_sqlite as sqlite;

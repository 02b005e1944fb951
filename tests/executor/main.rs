//! Executor Tests
//!
//! End-to-end tests for the sqlexec executor against a recording mock
//! connection source:
//! - Transactions: commit on success, rollback on failure, release on every path
//! - Lifecycle: initialize, submit, shutdown state transitions
//! - Cancellation: cancel before start, cooperative flag while running
//! - Concurrency: serial ordering, bounded parallelism, unbounded growth
//! - Shutdown: grace period, forced cancellation, idempotence
//! - Config: loading `sqlexec.toml`

mod common;

mod cancellation;
mod config;
mod transactions;

//! Error types for connection sources and connections
//!
//! This module defines the failures a connection source or a live connection
//! can report. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.

use std::time::Duration;
use thiserror::Error;

/// Boxed driver error carried through the connection seams
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for connection source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Failures reported by a [`ConnectionSource`](crate::ConnectionSource)
#[derive(Debug, Error)]
pub enum SourceError {
    /// Every connection the source may issue is already checked out
    #[error("connection source exhausted: {active} of {max_active} connections in use")]
    Exhausted {
        /// Connections currently checked out
        active: u32,
        /// Maximum the source is configured to issue
        max_active: u32,
    },

    /// Waited too long for a connection
    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// The source has been closed and issues no more connections
    #[error("connection source is closed")]
    Closed,

    /// The source configuration was rejected at construction
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),

    /// Driver or network failure while opening or closing connections
    #[error("driver error: {0}")]
    Driver(#[source] BoxError),
}

impl SourceError {
    /// Create an invalid-configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SourceError::InvalidConfig(msg.into())
    }

    /// Wrap a driver error
    pub fn driver(err: impl Into<BoxError>) -> Self {
        SourceError::Driver(err.into())
    }
}

/// Which connection-level transaction operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOp {
    /// Disabling auto-commit / starting a transaction
    Begin,
    /// Committing the transaction
    Commit,
    /// Rolling the transaction back
    Rollback,
}

impl std::fmt::Display for TxnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxnOp::Begin => write!(f, "begin"),
            TxnOp::Commit => write!(f, "commit"),
            TxnOp::Rollback => write!(f, "rollback"),
        }
    }
}

/// Failure of a transaction operation on a live connection
#[derive(Debug, Error)]
#[error("{op} failed: {source}")]
pub struct ConnectionError {
    /// The operation that failed
    pub op: TxnOp,
    /// Underlying driver error
    #[source]
    pub source: BoxError,
}

impl ConnectionError {
    /// Create a connection error for the given operation
    pub fn new(op: TxnOp, source: impl Into<BoxError>) -> Self {
        Self {
            op,
            source: source.into(),
        }
    }
}

/// Failures collected while shutting down a [`SourceRegistry`](crate::SourceRegistry)
///
/// Every source is closed even when earlier ones fail; each failure is kept
/// together with the URL of the source that produced it.
#[derive(Debug, Error)]
#[error("failed to close {} connection source(s): {}", .failures.len(), summarize(.failures))]
pub struct RegistryError {
    /// `(url, error)` for every source that failed to close
    pub failures: Vec<(String, SourceError)>,
}

fn summarize(failures: &[(String, SourceError)]) -> String {
    failures
        .iter()
        .map(|(url, err)| format!("[{}] {}", url, err))
        .collect::<Vec<_>>()
        .join("; ")
}

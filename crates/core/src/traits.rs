//! Core traits for the connection seam
//!
//! This module defines the Connection, ConnectionSource and SourceFactory
//! traits that let the executor run against any pooling library or driver
//! without knowing which one it is.

use crate::config::SourceConfig;
use crate::error::{ConnectionError, SourceResult};

/// A live database connection as seen by the executor
///
/// The executor only needs transaction control. Everything else a task does
/// with the connection goes through the concrete type's own API.
pub trait Connection: Send {
    /// Start a transaction (disable auto-commit)
    ///
    /// # Errors
    ///
    /// Returns an error if the driver refuses to start a transaction.
    fn begin(&mut self) -> Result<(), ConnectionError>;

    /// Commit the open transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails. The transaction outcome is then
    /// unknown to the caller.
    fn commit(&mut self) -> Result<(), ConnectionError>;

    /// Roll back the open transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    fn rollback(&mut self) -> Result<(), ConnectionError>;
}

/// Supplies connections on demand and reclaims them when released
///
/// Thread safety: `acquire` and `release` are called concurrently from every
/// executor worker, so implementations must be `Send + Sync`. The source alone
/// is responsible for how connections are issued (pooling, caps, timeouts).
pub trait ConnectionSource: Send + Sync + 'static {
    /// The connection type issued by this source
    type Connection: Connection + 'static;

    /// Get a connection, blocking up to the source's own timeout
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, exhaustion, or driver/network failure.
    fn acquire(&self) -> SourceResult<Self::Connection>;

    /// Hand a connection back to the source
    fn release(&self, conn: Self::Connection);

    /// Close the source and everything it still holds
    ///
    /// Called by [`SourceRegistry::shutdown`](crate::SourceRegistry::shutdown).
    /// Sources that own nothing closeable keep the default.
    fn close(&self) -> SourceResult<()> {
        Ok(())
    }
}

/// Builds a connection source from an explicit configuration
///
/// Validation of the configuration (URL shape, driver acceptance) happens
/// here, at construction, rather than inside the source.
pub trait SourceFactory: Send + Sync {
    /// The source type this factory builds
    type Source: ConnectionSource;

    /// Create a new source for `config`
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidConfig`](crate::SourceError::InvalidConfig)
    /// if the configuration is not acceptable to this driver.
    fn create(&self, config: &SourceConfig) -> SourceResult<Self::Source>;
}

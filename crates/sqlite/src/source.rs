//! Connection source over one SQLite database file
//!
//! Pooling is delegated to `deadpool`. This module supplies the manager that
//! opens connections and maps pool failures onto [`SourceError`].

use deadpool::managed::{self, Metrics, Object, Pool, PoolError, RecycleResult, Timeouts};
use sqlexec_core::{ConnectionSource, SourceConfig, SourceError, SourceResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::connection::SqliteConnection;
use crate::factory;

/// Opens rusqlite connections for the pool.
#[derive(Debug)]
pub struct SqliteManager {
    path: PathBuf,
    busy_timeout: Option<Duration>,
}

impl managed::Manager for SqliteManager {
    type Type = rusqlite::Connection;
    type Error = SourceError;

    async fn create(&self) -> Result<rusqlite::Connection, SourceError> {
        let conn = rusqlite::Connection::open(&self.path).map_err(SourceError::driver)?;
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout).map_err(SourceError::driver)?;
        }
        debug!(target: "sqlexec::sqlite", path = %self.path.display(), "Opened connection");
        Ok(conn)
    }

    async fn recycle(
        &self,
        _conn: &mut rusqlite::Connection,
        _: &Metrics,
    ) -> RecycleResult<SourceError> {
        // Connections with an open transaction never make it back into the pool
        Ok(())
    }
}

/// Issues connections to a single SQLite database file.
///
/// At most `max_active` connections are checked out at once; `acquire`
/// fails fast with [`SourceError::Exhausted`] beyond that. Released
/// connections are kept open for reuse, up to `max_idle`. A connection
/// released with a transaction still open is closed instead of kept.
pub struct SqliteSource {
    path: PathBuf,
    max_active: u32,
    max_idle: u32,
    pool: Pool<SqliteManager>,
}

impl SqliteSource {
    /// Build a source from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidConfig`] if the URL or a property is not
    /// acceptable. See [`parse_url`](crate::parse_url).
    pub fn from_config(config: &SourceConfig) -> SourceResult<Self> {
        config.validate()?;
        let path = factory::parse_url(&config.url)?;
        let busy_timeout = factory::busy_timeout(config)?;

        let manager = SqliteManager {
            path: path.clone(),
            busy_timeout,
        };
        let pool = Pool::builder(manager)
            .max_size(config.max_active as usize)
            .build()
            .map_err(|e| SourceError::invalid_config(e.to_string()))?;

        Ok(Self {
            path,
            max_active: config.max_active,
            max_idle: config.max_idle,
            pool,
        })
    }

    /// Database file this source opens.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connections currently checked out.
    pub fn active(&self) -> u32 {
        let status = self.pool.status();
        status.size.saturating_sub(status.available) as u32
    }

    /// Open connections waiting for reuse.
    pub fn idle(&self) -> usize {
        self.pool.status().available
    }

    /// Whether [`close`](ConnectionSource::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn map_pool_error(&self, err: PoolError<SourceError>) -> SourceError {
        match err {
            PoolError::Backend(e) => e,
            PoolError::Closed => SourceError::Closed,
            PoolError::Timeout(_) => SourceError::Exhausted {
                active: self.active(),
                max_active: self.max_active,
            },
            other => SourceError::driver(other.to_string()),
        }
    }
}

impl ConnectionSource for SqliteSource {
    type Connection = SqliteConnection;

    fn acquire(&self) -> SourceResult<SqliteConnection> {
        // A zero wait makes the pool try its semaphore once instead of parking
        let timeouts = Timeouts {
            wait: Some(Duration::ZERO),
            create: None,
            recycle: None,
        };
        futures::executor::block_on(self.pool.timeout_get(&timeouts))
            .map(SqliteConnection::new)
            .map_err(|e| self.map_pool_error(e))
    }

    fn release(&self, conn: SqliteConnection) {
        let object = conn.into_inner();
        let reusable = !self.pool.is_closed()
            && object.is_autocommit()
            && self.idle() < self.max_idle as usize;
        if reusable {
            drop(object);
            return;
        }

        let conn = Object::take(object);
        if let Err((_, e)) = conn.close() {
            warn!(target: "sqlexec::sqlite", error = %e, "Failed to close released connection");
        }
    }

    fn close(&self) -> SourceResult<()> {
        let idle = self.idle();
        self.pool.close();
        info!(target: "sqlexec::sqlite", path = %self.path.display(), closed = idle, "Source closed");
        Ok(())
    }
}

impl std::fmt::Debug for SqliteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSource")
            .field("path", &self.path)
            .field("max_active", &self.max_active)
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

//! Transaction control over a rusqlite connection

use deadpool::managed::Object;
use sqlexec_core::{Connection, ConnectionError, TxnOp};
use std::ops::{Deref, DerefMut};

use crate::source::SqliteManager;

/// A SQLite connection issued by [`SqliteSource`](crate::SqliteSource).
///
/// Derefs to [`rusqlite::Connection`], so task bodies use the driver API
/// directly:
///
/// ```text
/// executor.submit(|conn: &mut SqliteConnection, _ctx| {
///     conn.execute("INSERT INTO t (v) VALUES (?1)", [42])?;
///     Ok(())
/// })?;
/// ```
pub struct SqliteConnection {
    inner: Object<SqliteManager>,
}

impl SqliteConnection {
    pub(crate) fn new(inner: Object<SqliteManager>) -> Self {
        Self { inner }
    }

    pub(crate) fn into_inner(self) -> Object<SqliteManager> {
        self.inner
    }

    fn run(&mut self, op: TxnOp, sql: &str) -> Result<(), ConnectionError> {
        self.inner
            .execute_batch(sql)
            .map_err(|e| ConnectionError::new(op, e))
    }
}

impl Connection for SqliteConnection {
    fn begin(&mut self) -> Result<(), ConnectionError> {
        self.run(TxnOp::Begin, "BEGIN")
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        self.run(TxnOp::Commit, "COMMIT")
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        self.run(TxnOp::Rollback, "ROLLBACK")
    }
}

impl Deref for SqliteConnection {
    type Target = rusqlite::Connection;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DerefMut for SqliteConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.inner
    }
}

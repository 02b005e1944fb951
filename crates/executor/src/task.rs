//! Reusable task type

use sqlexec_core::Connection;

use crate::context::ExecutionContext;

/// A unit of transactional work.
///
/// Closures passed to [`SqlExecutor::submit`](crate::SqlExecutor::submit)
/// cover most uses. Implement this trait when a task carries its own
/// parameters or is submitted from several places.
///
/// The body runs inside a transaction on `conn`. Returning `Ok` commits;
/// returning `Err` or panicking rolls back. The body must not call
/// `begin`, `commit` or `rollback` itself.
///
/// ```
/// use sqlexec_executor::{ExecutionContext, SqlTask};
/// use sqlexec_core::{Connection, ConnectionError};
///
/// struct Noop;
///
/// impl Connection for Noop {
///     fn begin(&mut self) -> Result<(), ConnectionError> { Ok(()) }
///     fn commit(&mut self) -> Result<(), ConnectionError> { Ok(()) }
///     fn rollback(&mut self) -> Result<(), ConnectionError> { Ok(()) }
/// }
///
/// struct Answer(u32);
///
/// impl SqlTask<Noop> for Answer {
///     type Output = u32;
///
///     fn execute(self, _conn: &mut Noop, ctx: &ExecutionContext) -> anyhow::Result<u32> {
///         if ctx.is_cancelled() {
///             anyhow::bail!("cancelled");
///         }
///         Ok(self.0)
///     }
/// }
/// ```
pub trait SqlTask<C: Connection>: Send + 'static {
    /// Value produced on success
    type Output: Send + 'static;

    /// Run the task body against a connection with an open transaction.
    fn execute(self, conn: &mut C, ctx: &ExecutionContext) -> anyhow::Result<Self::Output>;
}

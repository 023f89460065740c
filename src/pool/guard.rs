use std::fmt;
use std::ops::Deref;

use crate::driver::Connector;
use crate::error::PoolError;

use super::handle::ConnHandle;
use super::locking::LockStrategy;
use super::state::CheckinOptions;
use super::Pool;

/// Checked-out connection that goes back to its pool when dropped.
///
/// The drop path checks in with `fail_silently`, so a guard outliving a
/// disposed pool is harmless. Failures on drop are logged, never raised.
pub struct PooledConnection<'p, D, L>
where
    D: Connector,
    L: LockStrategy<D::Connection>,
{
    pool: &'p Pool<D, L>,
    conn: ConnHandle<D::Connection>,
    released: bool,
}

impl<'p, D, L> PooledConnection<'p, D, L>
where
    D: Connector,
    L: LockStrategy<D::Connection>,
{
    pub(crate) fn new(pool: &'p Pool<D, L>, conn: ConnHandle<D::Connection>) -> Self {
        Self {
            pool,
            conn,
            released: false,
        }
    }

    /// Check the connection in now and report the outcome.
    ///
    /// # Errors
    /// Same as [`Pool::checkin`].
    pub fn release(self) -> Result<(), PoolError> {
        self.finish(CheckinOptions::new())
    }

    /// Check the connection in and close it instead of keeping it for reuse.
    ///
    /// # Errors
    /// Same as [`Pool::checkin`].
    pub fn close(self) -> Result<(), PoolError> {
        self.finish(CheckinOptions::new().close())
    }

    fn finish(mut self, options: CheckinOptions) -> Result<(), PoolError> {
        self.released = true;
        self.pool.checkin(self.conn.clone(), options)
    }
}

impl<D, L> Deref for PooledConnection<'_, D, L>
where
    D: Connector,
    L: LockStrategy<D::Connection>,
{
    type Target = ConnHandle<D::Connection>;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<D, L> Drop for PooledConnection<'_, D, L>
where
    D: Connector,
    L: LockStrategy<D::Connection>,
{
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let options = CheckinOptions::new().fail_silently();
        if let Err(err) = self.pool.checkin(self.conn.clone(), options) {
            tracing::warn!(conn = %self.conn.id(), error = %err, "automatic checkin failed");
        }
    }
}

impl<D, L> fmt::Debug for PooledConnection<'_, D, L>
where
    D: Connector,
    L: LockStrategy<D::Connection>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("released", &self.released)
            .finish()
    }
}

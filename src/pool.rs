//! Keyed connection pool.
//!
//! A [`Pool`] is the composition of a [`Connector`], a [`PoolConfig`], a
//! [`Clock`] and a [`LockStrategy`]. The strategy is picked at construction:
//! [`SharedPool`] (one mutex, safe across threads) or [`LocalPool`] (no lock,
//! single thread only).
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # fn demo() -> Result<(), sql_keyed_pool::PoolError> {
//! use sql_keyed_pool::sqlite::SqliteConnector;
//! use sql_keyed_pool::{CheckinOptions, ConnectParams, Pool, PoolConfig};
//!
//! let config = PoolConfig::builder(ConnectParams::Dsn("app.db".into()))
//!     .max_conn(4)
//!     .expiration_secs(60)
//!     .build()?;
//! let pool = Pool::exclusive(SqliteConnector::new(), config)?;
//!
//! let conn = pool.checkout(None)?;
//! conn.lock().execute_batch("CREATE TABLE IF NOT EXISTS t (id INTEGER)")?;
//! pool.checkin(conn, CheckinOptions::new())?;
//! pool.dispose()?;
//! # Ok(())
//! # }
//! ```

mod clock;
mod guard;
mod handle;
mod key;
mod locking;
mod state;
mod status;

use std::fmt;
use std::sync::Arc;

use crate::config::PoolConfig;
use crate::driver::Connector;
use crate::error::PoolError;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::guard::PooledConnection;
pub use self::handle::{ConnHandle, ConnId};
pub use self::key::Key;
pub use self::locking::{Exclusive, LockStrategy, Unshared};
pub use self::state::{CheckinOptions, PoolState};
pub use self::status::PoolStatus;

use self::state::Context;

/// Pool safe to share between threads.
pub type SharedPool<D> = Pool<D, Exclusive<<D as Connector>::Connection>>;

/// Pool for a single thread; no locking.
pub type LocalPool<D> = Pool<D, Unshared<<D as Connector>::Connection>>;

pub struct Pool<D, L = Exclusive<<D as Connector>::Connection>>
where
    D: Connector,
    L: LockStrategy<D::Connection>,
{
    connector: D,
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    lock: L,
}

impl<D: Connector> Pool<D, Exclusive<D::Connection>> {
    /// Thread-safe pool.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` if `config` is invalid.
    pub fn exclusive(connector: D, config: PoolConfig) -> Result<Self, PoolError> {
        Self::new(connector, config)
    }
}

impl<D: Connector> Pool<D, Unshared<D::Connection>> {
    /// Single-threaded pool without locking.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` if `config` is invalid.
    pub fn unshared(connector: D, config: PoolConfig) -> Result<Self, PoolError> {
        Self::new(connector, config)
    }
}

impl<D, L> Pool<D, L>
where
    D: Connector,
    L: LockStrategy<D::Connection>,
{
    /// # Errors
    /// Returns `PoolError::ConfigError` if `config` is invalid.
    pub fn new(connector: D, config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_clock(connector, config, Arc::new(SystemClock))
    }

    /// Build a pool whose idle timestamps come from `clock`.
    ///
    /// # Errors
    /// Returns `PoolError::ConfigError` if `config` is invalid.
    pub fn with_clock(
        connector: D,
        config: PoolConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        config.log.emit(format_args!(
            "Pool configured [max_conn: {}, expiration: {:?}, pooling: {}]",
            config.max_conn, config.expiration, !config.disable_pooling
        ));
        Ok(Self {
            connector,
            config,
            clock,
            lock: L::new(PoolState::default()),
        })
    }

    fn context(&self) -> Context<'_, D> {
        Context {
            connector: &self.connector,
            config: &self.config,
            clock: self.clock.as_ref(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn connector(&self) -> &D {
        &self.connector
    }

    /// Check out a connection for exclusive use under `key`.
    ///
    /// Without a key the pool generates one. A key that already holds a
    /// connection gets that same connection back.
    ///
    /// # Errors
    /// `Disposed` after [`Pool::dispose`], `Exhausted` when every slot is in
    /// use, `ConnectFailure` when the driver cannot open a connection.
    pub fn checkout(&self, key: Option<Key>) -> Result<ConnHandle<D::Connection>, PoolError> {
        let ctx = self.context();
        self.lock.with(|state| state.checkout(&ctx, key))
    }

    /// Return a connection, rolling back any open transaction first.
    ///
    /// # Errors
    /// `Disposed` after [`Pool::dispose`] (unless `fail_silently`),
    /// `UnkeyedRelease` when the connection is not checked out under a known key.
    pub fn checkin(
        &self,
        conn: ConnHandle<D::Connection>,
        options: CheckinOptions,
    ) -> Result<(), PoolError> {
        let ctx = self.context();
        self.lock.with(|state| state.checkin(&ctx, conn, options))
    }

    /// Close every free connection idle for at least the configured expiration.
    pub fn purge_expired(&self) {
        let ctx = self.context();
        self.lock.with(|state| state.purge_expired(&ctx));
    }

    /// Close every connection, free or checked out, and refuse further use.
    ///
    /// # Errors
    /// `Disposed` if the pool was already disposed.
    pub fn dispose(&self) -> Result<(), PoolError> {
        let ctx = self.context();
        self.lock.with(|state| state.dispose(&ctx))
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock.with(|state| state.is_disposed())
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.lock.with(|state| state.status(&self.config))
    }

    /// Key the connection is checked out under, if any.
    #[must_use]
    pub fn key_of(&self, conn: &ConnHandle<D::Connection>) -> Option<Key> {
        self.lock.with(|state| state.key_of(conn))
    }

    /// Check out a connection that is checked back in when the guard drops.
    ///
    /// # Errors
    /// Same as [`Pool::checkout`].
    pub fn get(&self) -> Result<PooledConnection<'_, D, L>, PoolError> {
        self.get_keyed(None)
    }

    /// Keyed variant of [`Pool::get`].
    ///
    /// # Errors
    /// Same as [`Pool::checkout`].
    pub fn get_keyed(&self, key: Option<Key>) -> Result<PooledConnection<'_, D, L>, PoolError> {
        let conn = self.checkout(key)?;
        Ok(PooledConnection::new(self, conn))
    }
}

impl<D, L> fmt::Debug for Pool<D, L>
where
    D: Connector,
    L: LockStrategy<D::Connection> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("lock", &self.lock)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<D, L> Drop for Pool<D, L>
where
    D: Connector,
    L: LockStrategy<D::Connection>,
{
    fn drop(&mut self) {
        let ctx = Context {
            connector: &self.connector,
            config: &self.config,
            clock: self.clock.as_ref(),
        };
        let state = self.lock.state_mut();
        if !state.is_disposed() {
            // teardown never raises; an already disposed pool is left alone
            let _ = state.dispose(&ctx);
        }
        state.close_busy(&ctx);
    }
}

//! Keyed pooling logic without any locking.
//!
//! Every method here assumes the caller holds whatever exclusion the
//! selected [`super::LockStrategy`] provides.

use std::collections::HashMap;
use std::mem;
use std::time::Instant;

use crate::config::PoolConfig;
use crate::driver::{Connector, PhysicalConnection, TransactionStatus};
use crate::error::PoolError;

use super::clock::Clock;
use super::handle::{ConnHandle, ConnId};
use super::key::Key;
use super::status::PoolStatus;

/// What the pool is operating with for the duration of one call.
pub(crate) struct Context<'a, D> {
    pub(crate) connector: &'a D,
    pub(crate) config: &'a PoolConfig,
    pub(crate) clock: &'a dyn Clock,
}

impl<D> Context<'_, D> {
    fn pooling(&self) -> bool {
        !self.config.disable_pooling
    }
}

macro_rules! trace {
    ($ctx:expr, $($arg:tt)*) => {
        $ctx.config.log.emit(format_args!($($arg)*))
    };
}

/// Options for [`super::Pool::checkin`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckinOptions {
    /// Owning key; looked up from the connection when `None`.
    pub key: Option<Key>,
    /// Close the connection instead of keeping it for reuse.
    pub close: bool,
    /// Return `Ok` instead of `Disposed` when the pool is already disposed.
    pub fail_silently: bool,
}

impl CheckinOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn close(mut self) -> Self {
        self.close = true;
        self
    }

    #[must_use]
    pub fn fail_silently(mut self) -> Self {
        self.fail_silently = true;
        self
    }
}

enum Reconciled {
    Keep,
    Discard,
}

/// Bookkeeping owned by one pool.
pub struct PoolState<C> {
    free: Vec<ConnHandle<C>>,
    used: HashMap<Key, ConnHandle<C>>,
    reverse: HashMap<ConnId, Key>,
    last_used: HashMap<ConnId, Instant>,
    /// Checked-out connections dispose could not lock; closed once returned.
    busy: Vec<ConnHandle<C>>,
    last_key: u64,
    last_conn_id: u64,
    disposed: bool,
}

impl<C> Default for PoolState<C> {
    fn default() -> Self {
        Self {
            free: Vec::new(),
            used: HashMap::new(),
            reverse: HashMap::new(),
            last_used: HashMap::new(),
            busy: Vec::new(),
            last_key: 0,
            last_conn_id: 0,
            disposed: false,
        }
    }
}

impl<C: PhysicalConnection> PoolState<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn status(&self, config: &PoolConfig) -> PoolStatus {
        PoolStatus {
            max_conn: config.max_conn,
            free: self.free.len(),
            used: self.used.len(),
            disposed: self.disposed,
            pooling_disabled: config.disable_pooling,
        }
    }

    /// Key owning this exact connection. A handle from another pool that
    /// happens to carry a known id has no key here.
    pub(crate) fn key_of(&self, handle: &ConnHandle<C>) -> Option<Key> {
        let key = self.reverse.get(&handle.id())?;
        self.used
            .get(key)
            .filter(|owned| owned.same_conn(handle))
            .map(|_| key.clone())
    }

    /// Next generated key. Skips numbers a caller already holds as `Key::Auto`.
    fn next_key(&mut self) -> Key {
        loop {
            self.last_key += 1;
            let key = Key::Auto(self.last_key);
            if !self.used.contains_key(&key) {
                return key;
            }
        }
    }

    fn connect<D>(&mut self, ctx: &Context<'_, D>) -> Result<ConnHandle<C>, PoolError>
    where
        D: Connector<Connection = C>,
    {
        let conn = ctx
            .connector
            .connect(&ctx.config.connect)
            .map_err(PoolError::ConnectFailure)?;
        self.last_conn_id += 1;
        let handle = ConnHandle::new(ConnId(self.last_conn_id), conn);
        trace!(ctx, "Connection created {}", handle.id());
        Ok(handle)
    }

    fn register(&mut self, key: Key, handle: &ConnHandle<C>) {
        self.reverse.insert(handle.id(), key.clone());
        self.used.insert(key, handle.clone());
    }

    fn stow(&mut self, now: Instant, handle: ConnHandle<C>) {
        self.last_used.insert(handle.id(), now);
        self.free.push(handle);
    }

    pub(crate) fn checkout<D>(
        &mut self,
        ctx: &Context<'_, D>,
        key: Option<Key>,
    ) -> Result<ConnHandle<C>, PoolError>
    where
        D: Connector<Connection = C>,
    {
        if self.disposed {
            return Err(PoolError::Disposed);
        }
        if !ctx.pooling() {
            return self.connect(ctx);
        }

        let key = match key {
            Some(key) => key,
            None => self.next_key(),
        };
        if let Some(handle) = self.used.get(&key) {
            return Ok(handle.clone());
        }

        if let Some(handle) = self.free.pop() {
            self.last_used.remove(&handle.id());
            self.register(key, &handle);
            trace!(ctx, "Connection reused {} [pool: {}]", handle.id(), self.free.len());
            return Ok(handle);
        }

        if self.used.len() >= ctx.config.max_conn {
            return Err(PoolError::Exhausted {
                max_conn: ctx.config.max_conn,
            });
        }
        let handle = self.connect(ctx)?;
        self.register(key, &handle);
        Ok(handle)
    }

    pub(crate) fn checkin<D>(
        &mut self,
        ctx: &Context<'_, D>,
        handle: ConnHandle<C>,
        options: CheckinOptions,
    ) -> Result<(), PoolError> {
        if !ctx.pooling() {
            close_handle(ctx, &handle);
            return Ok(());
        }

        match &options.key {
            Some(key) => trace!(ctx, "Putting away {} key={}", handle.id(), key),
            None => trace!(ctx, "Putting away {}", handle.id()),
        }
        if self.disposed {
            self.release_busy(ctx, &handle);
            if options.fail_silently {
                return Ok(());
            }
            return Err(PoolError::Disposed);
        }

        let key = match options.key {
            Some(key) => key,
            None => self
                .key_of(&handle)
                .ok_or(PoolError::UnkeyedRelease(handle.id()))?,
        };
        match self.used.get(&key) {
            Some(owned) if owned.same_conn(&handle) => {}
            _ => return Err(PoolError::UnkeyedRelease(handle.id())),
        }
        self.used.remove(&key);
        self.reverse.remove(&handle.id());

        if !options.close && self.free.len() < ctx.config.max_conn {
            if let Reconciled::Keep = reconcile(ctx, &handle) {
                self.stow(ctx.clock.now(), handle);
            }
        } else {
            trace!(
                ctx,
                "Closing (pool exhausted or explicit close requested) {}",
                handle.id()
            );
            close_handle(ctx, &handle);
        }

        self.purge_expired(ctx);
        Ok(())
    }

    pub(crate) fn purge_expired<D>(&mut self, ctx: &Context<'_, D>) {
        if !ctx.pooling() {
            return;
        }

        let now = ctx.clock.now();
        let expiration = ctx.config.expiration;
        let last_used = &self.last_used;
        let (expired, kept): (Vec<_>, Vec<_>) =
            mem::take(&mut self.free).into_iter().partition(|handle| {
                let idle_since = last_used.get(&handle.id());
                debug_assert!(idle_since.is_some(), "free {} has no idle timestamp", handle.id());
                idle_since.is_none_or(|at| now.saturating_duration_since(*at) >= expiration)
            });
        self.free = kept;

        trace!(
            ctx,
            "Purging... [pool: {}, expired: {}]",
            self.free.len() + expired.len(),
            expired.len()
        );
        for handle in expired {
            self.last_used.remove(&handle.id());
            close_handle(ctx, &handle);
        }
    }

    pub(crate) fn dispose<D>(&mut self, ctx: &Context<'_, D>) -> Result<(), PoolError> {
        if self.disposed {
            return Err(PoolError::Disposed);
        }

        let free = mem::take(&mut self.free);
        let used = mem::take(&mut self.used);
        if ctx.pooling() {
            trace!(ctx, "Closing {} connection(s)", free.len() + used.len());
            for handle in free.iter().chain(used.values()) {
                match handle.try_lock() {
                    Some(mut conn) => close_conn(ctx, handle.id(), &mut *conn),
                    None => {
                        tracing::warn!(
                            conn = %handle.id(),
                            "connection busy during dispose; it is closed when checked in"
                        );
                        self.busy.push(handle.clone());
                    }
                }
            }
        }

        self.disposed = true;
        self.reverse.clear();
        self.last_used.clear();
        Ok(())
    }

    /// Close a connection dispose had to skip, now that its borrower returned it.
    fn release_busy<D>(&mut self, ctx: &Context<'_, D>, handle: &ConnHandle<C>) {
        let Some(pos) = self.busy.iter().position(|b| b.same_conn(handle)) else {
            return;
        };
        if let Some(mut conn) = handle.try_lock() {
            close_conn(ctx, handle.id(), &mut *conn);
            drop(conn);
            self.busy.swap_remove(pos);
        }
    }

    /// Last attempt at the connections dispose skipped; runs when the pool drops.
    pub(crate) fn close_busy<D>(&mut self, ctx: &Context<'_, D>) {
        for handle in mem::take(&mut self.busy) {
            match handle.try_lock() {
                Some(mut conn) => close_conn(ctx, handle.id(), &mut *conn),
                None => tracing::warn!(
                    conn = %handle.id(),
                    "connection still busy when the pool dropped; it closes with its last handle"
                ),
            }
        }
    }
}

/// Bring a returned connection back to a reusable state, or close it.
fn reconcile<C, D>(ctx: &Context<'_, D>, handle: &ConnHandle<C>) -> Reconciled
where
    C: PhysicalConnection,
{
    let mut conn = handle.lock();
    if conn.is_closed() {
        // the server already ended it
        trace!(ctx, "Discarding closed connection {}", handle.id());
        return Reconciled::Discard;
    }
    match conn.transaction_status() {
        TransactionStatus::Idle => Reconciled::Keep,
        TransactionStatus::Unknown => {
            trace!(ctx, "Connection lost. Closing {}", handle.id());
            close_conn(ctx, handle.id(), &mut *conn);
            Reconciled::Discard
        }
        TransactionStatus::InTransaction | TransactionStatus::Error => {
            trace!(ctx, "Connection is in transaction. Rolling back {}", handle.id());
            match conn.rollback() {
                Ok(()) => Reconciled::Keep,
                Err(err) => {
                    tracing::warn!(conn = %handle.id(), error = %err, "rollback failed; evicting connection");
                    close_conn(ctx, handle.id(), &mut *conn);
                    Reconciled::Discard
                }
            }
        }
    }
}

fn close_handle<C, D>(ctx: &Context<'_, D>, handle: &ConnHandle<C>)
where
    C: PhysicalConnection,
{
    close_conn(ctx, handle.id(), &mut *handle.lock());
}

/// Close and swallow the failure; cleanup must go on for the other connections.
fn close_conn<C, D>(ctx: &Context<'_, D>, id: ConnId, conn: &mut C)
where
    C: PhysicalConnection,
{
    if conn.is_closed() {
        return;
    }
    match conn.close() {
        Ok(()) => trace!(ctx, "Connection closed: {}", id),
        Err(err) => tracing::warn!(conn = %id, error = %err, "failed to close connection"),
    }
}

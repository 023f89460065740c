use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use serde::Serialize;

/// Token the pool issues for every physical connection it opens.
///
/// Ids are unique within one pool only. Reverse lookups go through the id,
/// and ownership checks also compare the shared connection with
/// [`ConnHandle::same_conn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnId(pub(crate) u64);

impl ConnId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Shared handle to a physical connection.
///
/// The borrower and the pool's used map hold clones of the same handle. The
/// inner mutex only arbitrates between the borrower and pool teardown; one
/// borrower owns a checked-out connection at a time.
pub struct ConnHandle<C> {
    id: ConnId,
    inner: Arc<Mutex<C>>,
}

impl<C> ConnHandle<C> {
    pub(crate) fn new(id: ConnId, conn: C) -> Self {
        Self {
            id,
            inner: Arc::new(Mutex::new(conn)),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Whether both handles point at the same physical connection.
    #[must_use]
    pub fn same_conn(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Lock the connection for use. A poisoned lock is recovered; the
    /// connection's own state is re-checked at checkin anyway.
    pub fn lock(&self) -> MutexGuard<'_, C> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the connection.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.lock())
    }

    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, C>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

impl<C> Clone for ConnHandle<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> PartialEq for ConnHandle<C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<C> Eq for ConnHandle<C> {}

impl<C> fmt::Debug for ConnHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnHandle").field("id", &self.id).finish()
    }
}

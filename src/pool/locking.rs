use std::cell::RefCell;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use super::state::PoolState;

/// How a [`super::Pool`] serializes access to its bookkeeping.
///
/// Each public pool operation runs exactly one closure through [`LockStrategy::with`].
pub trait LockStrategy<C> {
    fn new(state: PoolState<C>) -> Self
    where
        Self: Sized;

    /// Run `f` with exclusive access to the state.
    fn with<R>(&self, f: impl FnOnce(&mut PoolState<C>) -> R) -> R;

    /// Direct access when the caller already owns the pool (teardown).
    fn state_mut(&mut self) -> &mut PoolState<C>;
}

/// One mutex per pool, held for the whole body of every operation.
pub struct Exclusive<C> {
    state: Mutex<PoolState<C>>,
}

impl<C> LockStrategy<C> for Exclusive<C> {
    fn new(state: PoolState<C>) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut PoolState<C>) -> R) -> R {
        // a panic inside a driver call poisons the lock; the bookkeeping
        // itself is only mutated after driver calls return
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn state_mut(&mut self) -> &mut PoolState<C> {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

/// No locking. The `RefCell` makes the pool `!Sync`, so sharing it across
/// threads is rejected at compile time.
pub struct Unshared<C> {
    state: RefCell<PoolState<C>>,
}

impl<C> LockStrategy<C> for Unshared<C> {
    fn new(state: PoolState<C>) -> Self {
        Self {
            state: RefCell::new(state),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut PoolState<C>) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    fn state_mut(&mut self) -> &mut PoolState<C> {
        self.state.get_mut()
    }
}

impl<C> fmt::Debug for Exclusive<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Exclusive")
    }
}

impl<C> fmt::Debug for Unshared<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unshared")
    }
}

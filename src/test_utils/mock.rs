use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::ConnectParams;
use crate::driver::{Connector, DriverError, PhysicalConnection, TransactionStatus};

/// Observable state of one mock connection, shared with the test.
#[derive(Debug)]
pub struct MockProbe {
    serial: usize,
    status: Mutex<TransactionStatus>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    rollback_calls: AtomicUsize,
    fail_close: AtomicBool,
    fail_rollback: AtomicBool,
}

impl MockProbe {
    fn new(serial: usize) -> Self {
        Self {
            serial,
            status: Mutex::new(TransactionStatus::Idle),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            rollback_calls: AtomicUsize::new(0),
            fail_close: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
        }
    }

    /// 1-based order in which the connector opened this connection.
    #[must_use]
    pub fn serial(&self) -> usize {
        self.serial
    }

    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: TransactionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn rollback_calls(&self) -> usize {
        self.rollback_calls.load(Ordering::SeqCst)
    }

    /// Make every later `close()` fail.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Make every later `rollback()` fail.
    pub fn fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    /// Simulate the server ending the session: closed, but not by `close()`.
    pub fn sever(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connection handed out by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    probe: Arc<MockProbe>,
}

impl MockConnection {
    #[must_use]
    pub fn serial(&self) -> usize {
        self.probe.serial
    }

    #[must_use]
    pub fn probe(&self) -> Arc<MockProbe> {
        Arc::clone(&self.probe)
    }

    /// Open a transaction, as a borrower's `BEGIN` would.
    pub fn begin(&self) {
        self.probe.set_status(TransactionStatus::InTransaction);
    }

    pub fn commit(&self) {
        self.probe.set_status(TransactionStatus::Idle);
    }
}

impl PhysicalConnection for MockConnection {
    fn close(&mut self) -> Result<(), DriverError> {
        self.probe.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_close.load(Ordering::SeqCst) {
            return Err("injected close failure".into());
        }
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.probe.is_closed()
    }

    fn transaction_status(&self) -> TransactionStatus {
        self.probe.status()
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.probe.rollback_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_rollback.load(Ordering::SeqCst) {
            return Err("injected rollback failure".into());
        }
        self.probe.set_status(TransactionStatus::Idle);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Registry {
    opened: Mutex<Vec<Arc<MockProbe>>>,
    fail_connects: AtomicUsize,
}

/// Connector producing [`MockConnection`]s. Clones share one registry, so a
/// test can keep a clone while the pool owns another.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    registry: Arc<Registry>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.registry.fail_connects.store(count, Ordering::SeqCst);
    }

    #[must_use]
    pub fn connections_opened(&self) -> usize {
        self.opened().len()
    }

    /// Probe for the connection opened `serial`-th (1-based).
    #[must_use]
    pub fn probe(&self, serial: usize) -> Option<Arc<MockProbe>> {
        serial
            .checked_sub(1)
            .and_then(|idx| self.opened().get(idx).cloned())
    }

    /// Connections opened and not closed yet.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.opened().iter().filter(|p| !p.is_closed()).count()
    }

    fn opened(&self) -> std::sync::MutexGuard<'_, Vec<Arc<MockProbe>>> {
        self.registry
            .opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn connect(&self, _params: &ConnectParams) -> Result<MockConnection, DriverError> {
        let pending = self.registry.fail_connects.load(Ordering::SeqCst);
        if pending > 0 {
            self.registry
                .fail_connects
                .store(pending - 1, Ordering::SeqCst);
            return Err("injected connect failure".into());
        }
        let mut opened = self.opened();
        let probe = Arc::new(MockProbe::new(opened.len() + 1));
        opened.push(Arc::clone(&probe));
        Ok(MockConnection { probe })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connector_counts_and_fails_on_demand() {
        let connector = MockConnector::new();
        let params = ConnectParams::Dsn("mock".into());
        connector.fail_next_connects(1);
        assert!(connector.connect(&params).is_err());
        let conn = connector.connect(&params).unwrap();
        assert_eq!(conn.serial(), 1);
        assert_eq!(connector.connections_opened(), 1);
        assert_eq!(connector.probe(1).unwrap().serial(), 1);
        assert!(connector.probe(0).is_none());
    }

    #[test]
    fn rollback_returns_to_idle() {
        let connector = MockConnector::new();
        let mut conn = connector.connect(&ConnectParams::Dsn("mock".into())).unwrap();
        conn.begin();
        assert_eq!(conn.transaction_status(), TransactionStatus::InTransaction);
        conn.rollback().unwrap();
        assert_eq!(conn.transaction_status(), TransactionStatus::Idle);
        assert_eq!(conn.probe().rollback_calls(), 1);
    }
}

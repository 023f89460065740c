//! Capabilities the pool consumes from a database driver.
//!
//! The pool never runs queries. It only needs to open a connection, ask it
//! whether it is still usable, roll back a dangling transaction and close it.

use std::error::Error;

use crate::config::ConnectParams;

/// Error type reported by drivers. Kept opaque so any client library fits.
pub type DriverError = Box<dyn Error + Send + Sync>;

/// Transaction state reported by a physical connection at checkin time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// No transaction in progress.
    Idle,
    /// A transaction is open and healthy.
    InTransaction,
    /// A transaction is open but failed; only a rollback is accepted.
    Error,
    /// The driver lost track of the server (broken link).
    Unknown,
}

/// A single physical database connection.
pub trait PhysicalConnection: Send {
    /// Close the connection. Must be safe to call on a connection the server already dropped.
    ///
    /// # Errors
    /// Returns the driver's error when the close handshake fails.
    fn close(&mut self) -> Result<(), DriverError>;

    fn is_closed(&self) -> bool;

    fn transaction_status(&self) -> TransactionStatus;

    /// Abort the open transaction, leaving the connection idle.
    ///
    /// # Errors
    /// Returns the driver's error when the rollback cannot be issued.
    fn rollback(&mut self) -> Result<(), DriverError>;
}

/// Factory for physical connections, supplied at pool construction.
pub trait Connector: Send + Sync {
    type Connection: PhysicalConnection + 'static;

    /// Open a new connection.
    ///
    /// # Errors
    /// Returns the driver's error when the connection cannot be established.
    fn connect(&self, params: &ConnectParams) -> Result<Self::Connection, DriverError>;
}

impl<F, C> Connector for F
where
    F: Fn(&ConnectParams) -> Result<C, DriverError> + Send + Sync,
    C: PhysicalConnection + 'static,
{
    type Connection = C;

    fn connect(&self, params: &ConnectParams) -> Result<C, DriverError> {
        self(params)
    }
}

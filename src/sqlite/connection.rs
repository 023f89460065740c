use std::fmt;

use rusqlite::Connection;

use crate::driver::{DriverError, PhysicalConnection, TransactionStatus};
use crate::error::PoolError;

/// Physical `SQLite` connection. Closing drops the inner `rusqlite` handle.
pub struct SqliteConnection {
    conn: Option<Connection>,
}

impl SqliteConnection {
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    /// Borrow the underlying `rusqlite` connection.
    ///
    /// # Errors
    /// Returns `PoolError::Closed` once the connection was closed.
    pub fn connection(&self) -> Result<&Connection, PoolError> {
        self.conn.as_ref().ok_or(PoolError::Closed)
    }

    /// Mutable access, needed for `rusqlite::Connection::transaction`.
    ///
    /// # Errors
    /// Returns `PoolError::Closed` once the connection was closed.
    pub fn connection_mut(&mut self) -> Result<&mut Connection, PoolError> {
        self.conn.as_mut().ok_or(PoolError::Closed)
    }

    /// Execute a batch of SQL statements.
    ///
    /// # Errors
    /// Returns `PoolError::Closed` or the `rusqlite` error.
    pub fn execute_batch(&self, sql: &str) -> Result<(), PoolError> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }
}

impl PhysicalConnection for SqliteConnection {
    fn close(&mut self) -> Result<(), DriverError> {
        match self.conn.take() {
            // on failure rusqlite hands the connection back; dropping it
            // releases what it can
            Some(conn) => conn.close().map_err(|(_, err)| Box::new(err) as DriverError),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn transaction_status(&self) -> TransactionStatus {
        match &self.conn {
            None => TransactionStatus::Unknown,
            Some(conn) if conn.is_autocommit() => TransactionStatus::Idle,
            Some(_) => TransactionStatus::InTransaction,
        }
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        let conn = self.conn.as_ref().ok_or_else(|| Box::new(PoolError::Closed) as DriverError)?;
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("open", &self.conn.is_some())
            .finish()
    }
}

use rusqlite::{Connection, OpenFlags};

use crate::config::ConnectParams;
use crate::driver::{Connector, DriverError};

use super::connection::SqliteConnection;

/// Opens `SQLite` connections for a pool.
///
/// The database path is [`ConnectParams::target`]: the DSN itself, or the
/// `database` component of a URL.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    flags: OpenFlags,
    init_sql: Option<String>,
}

impl Default for SqliteConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteConnector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: OpenFlags::default(),
            init_sql: None,
        }
    }

    #[must_use]
    pub fn builder() -> SqliteConnectorBuilder {
        SqliteConnectorBuilder::new()
    }
}

impl Connector for SqliteConnector {
    type Connection = SqliteConnection;

    fn connect(&self, params: &ConnectParams) -> Result<SqliteConnection, DriverError> {
        let conn = Connection::open_with_flags(params.target(), self.flags)?;
        if let Some(sql) = &self.init_sql {
            conn.execute_batch(sql)?;
        }
        Ok(SqliteConnection::new(conn))
    }
}

/// Fluent builder for [`SqliteConnector`].
#[derive(Debug, Clone)]
pub struct SqliteConnectorBuilder {
    connector: SqliteConnector,
}

impl Default for SqliteConnectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteConnectorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connector: SqliteConnector::new(),
        }
    }

    #[must_use]
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.connector.flags = flags;
        self
    }

    /// SQL run on every new connection, e.g. `PRAGMA journal_mode = WAL;`.
    #[must_use]
    pub fn init_sql(mut self, sql: impl Into<String>) -> Self {
        self.connector.init_sql = Some(sql.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteConnector {
        self.connector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{PhysicalConnection, TransactionStatus};

    #[test]
    fn init_sql_runs_on_connect() {
        let connector = SqliteConnector::builder()
            .init_sql("CREATE TEMP TABLE seen (id INTEGER);")
            .finish();
        let conn = connector
            .connect(&ConnectParams::Dsn(":memory:".into()))
            .unwrap();
        conn.execute_batch("INSERT INTO seen VALUES (1)").unwrap();
        assert_eq!(conn.transaction_status(), TransactionStatus::Idle);
    }

    #[test]
    fn connect_failure_surfaces_driver_error() {
        let connector = SqliteConnector::builder()
            .flags(OpenFlags::SQLITE_OPEN_READ_ONLY)
            .finish();
        let result = connector.connect(&ConnectParams::Dsn(
            "/nonexistent-dir/definitely/missing.db".into(),
        ));
        assert!(result.is_err());
    }
}

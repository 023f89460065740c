use thiserror::Error;

use crate::driver::DriverError;
use crate::pool::ConnId;

#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was disposed; no connection can be created, reused or returned.
    #[error("Connection pool is disposed")]
    Disposed,

    /// Every slot is checked out and no idle connection is available.
    #[error("Connection pool exhausted ({max_conn} connections in use)")]
    Exhausted { max_conn: usize },

    /// Checkin could not work out which key owns the connection.
    #[error("Trying to put un-keyed connection {0}")]
    UnkeyedRelease(ConnId),

    /// The driver could not open a new physical connection.
    #[error("Connect failure: {0}")]
    ConnectFailure(#[source] DriverError),

    /// The SQLite handle was already closed.
    #[error("Connection is closed")]
    Closed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),
}

impl PoolError {
    /// `true` for [`PoolError::Exhausted`], the one error worth retrying after a backoff.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(self, PoolError::Disposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinguishable() {
        let exhausted = PoolError::Exhausted { max_conn: 2 };
        assert!(exhausted.is_exhausted());
        assert!(!exhausted.is_disposed());
        assert!(PoolError::Disposed.is_disposed());
        assert_eq!(
            exhausted.to_string(),
            "Connection pool exhausted (2 connections in use)"
        );
    }

    #[test]
    fn connect_failure_keeps_driver_source() {
        let err = PoolError::ConnectFailure("refused".into());
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("refused"));
    }
}

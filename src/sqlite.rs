//! `SQLite` driver backed by `rusqlite`.
//!
//! `SQLite` has no server, so a connection never reports
//! [`crate::TransactionStatus::Unknown`] while open; the transaction state
//! comes from `sqlite3_get_autocommit`.

pub mod config;
pub mod connection;

pub use config::{SqliteConnector, SqliteConnectorBuilder};
pub use connection::SqliteConnection;

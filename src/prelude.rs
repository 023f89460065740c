//! Convenient imports for common functionality.

pub use crate::config::{ConnectParams, PoolConfig};
pub use crate::driver::{Connector, PhysicalConnection, TransactionStatus};
pub use crate::error::PoolError;
pub use crate::pool::{CheckinOptions, Key, LocalPool, Pool, PooledConnection, SharedPool};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteConnection, SqliteConnector};

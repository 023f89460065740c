//! Client-side keyed pool of physical database connections.
//!
//! Borrowers check a connection out under a key, use it exclusively and check
//! it back in. Checkin rolls back dangling transactions, drops broken
//! connections and purges connections idle past the configured expiration.
//! Capacity is bounded and exhaustion fails immediately instead of waiting.

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod pool;
pub mod prelude;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::{ConnectParams, ConnectUrl, PoolConfig, PoolConfigBuilder};
pub use driver::{Connector, DriverError, PhysicalConnection, TransactionStatus};
pub use error::PoolError;
pub use logging::{LogSink, RawSink};
pub use pool::{
    CheckinOptions, Clock, ConnHandle, ConnId, Exclusive, Key, LocalPool, LockStrategy,
    ManualClock, Pool, PoolStatus, PooledConnection, SharedPool, SystemClock, Unshared,
};

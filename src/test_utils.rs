//! Test utilities: a scriptable in-memory driver.
//!
//! Enabled with the `test-utils` feature. The integration tests and the
//! simulator build on these types.

pub mod mock;

pub use crate::pool::ManualClock;
pub use mock::{MockConnection, MockConnector, MockProbe};

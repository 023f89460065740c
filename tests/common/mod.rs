#![allow(dead_code)]

use std::sync::Arc;

use sql_keyed_pool::test_utils::{ManualClock, MockConnector};
use sql_keyed_pool::{ConnectParams, LocalPool, Pool, PoolConfig, SharedPool};

pub fn config(max_conn: usize, expiration_secs: u64) -> PoolConfig {
    PoolConfig::builder(ConnectParams::Dsn("mock".into()))
        .max_conn(max_conn)
        .expiration_secs(expiration_secs)
        .build()
        .expect("valid pool config")
}

/// Thread-safe pool over mock connections, driven by a manual clock.
pub fn shared_pool(
    max_conn: usize,
    expiration_secs: u64,
) -> (SharedPool<MockConnector>, MockConnector, ManualClock) {
    let connector = MockConnector::new();
    let clock = ManualClock::new();
    let pool = Pool::with_clock(
        connector.clone(),
        config(max_conn, expiration_secs),
        Arc::new(clock.clone()),
    )
    .expect("pool");
    (pool, connector, clock)
}

pub fn local_pool(
    config: PoolConfig,
) -> (LocalPool<MockConnector>, MockConnector, ManualClock) {
    let connector = MockConnector::new();
    let clock = ManualClock::new();
    let pool = Pool::with_clock(connector.clone(), config, Arc::new(clock.clone())).expect("pool");
    (pool, connector, clock)
}

mod common;

use std::collections::HashSet;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sql_keyed_pool::test_utils::MockConnection;
use sql_keyed_pool::{
    CheckinOptions, ConnHandle, ConnectParams, Key, PoolConfig, PoolError, TransactionStatus,
};

use common::local_pool;

const MAX_CONN: usize = 4;
const STEPS: usize = 4_000;
const NAMES: [&str; 3] = ["alpha", "beta", "gamma"];

fn run_seed(seed: u64) -> Result<(), PoolError> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let config = PoolConfig::builder(ConnectParams::Dsn("mock".into()))
        .max_conn(MAX_CONN)
        .expiration_secs(30)
        .build()?;
    let (pool, connector, clock) = local_pool(config);
    let mut held: Vec<(Key, ConnHandle<MockConnection>)> = Vec::new();
    let mut retired = HashSet::new();

    for step in 0..STEPS {
        match rng.random_range(0..10) {
            0..=3 => {
                let key = if rng.random_bool(0.3) {
                    Some(Key::from(NAMES[rng.random_range(0..NAMES.len())]))
                } else {
                    None
                };
                let already_held = key
                    .as_ref()
                    .and_then(|k| held.iter().find(|(hk, _)| hk == k))
                    .map(|(_, conn)| conn.id());
                let before = pool.status();
                match pool.checkout(key) {
                    Ok(conn) => {
                        if let Some(id) = already_held {
                            assert_eq!(conn.id(), id, "step {step}: held key changed connection");
                            continue;
                        }
                        assert!(!retired.contains(&conn.id()), "step {step}: closed connection reused");
                        assert!(
                            held.iter().all(|(_, h)| h.id() != conn.id()),
                            "step {step}: connection handed out twice"
                        );
                        let probe = conn.lock().probe();
                        assert!(!probe.is_closed());
                        assert_eq!(probe.status(), TransactionStatus::Idle);
                        let owner = pool.key_of(&conn).expect("checked-out connection has a key");
                        held.push((owner, conn));
                    }
                    Err(PoolError::Exhausted { .. }) => {
                        assert_eq!(before.used, MAX_CONN, "step {step}: exhausted below capacity");
                        assert_eq!(before.free, 0);
                    }
                    Err(other) => panic!("step {step}: unexpected checkout error: {other}"),
                }
            }
            4..=7 if !held.is_empty() => {
                let (key, conn) = held.swap_remove(rng.random_range(0..held.len()));
                let probe = conn.lock().probe();
                match rng.random_range(0..8) {
                    0 => conn.lock().begin(),
                    1 => probe.set_status(TransactionStatus::Error),
                    2 => probe.set_status(TransactionStatus::Unknown),
                    3 => probe.sever(),
                    4 => probe.fail_rollback(true),
                    _ => {}
                }
                if rng.random_bool(0.1) {
                    conn.lock().begin();
                }
                let options = if rng.random_bool(0.5) {
                    CheckinOptions::new().key(key)
                } else {
                    CheckinOptions::new()
                };
                let options = if rng.random_bool(0.1) { options.close() } else { options };
                let id = conn.id();
                pool.checkin(conn, options)?;
                if probe.is_closed() || probe.close_calls() > 0 {
                    retired.insert(id);
                }
            }
            8 => clock.advance(Duration::from_secs(rng.random_range(1..20))),
            _ => pool.purge_expired(),
        }

        let status = pool.status();
        assert!(status.size() <= MAX_CONN, "step {step}: over capacity");
        assert_eq!(status.used, held.len(), "step {step}: used map drifted");
        assert!(connector.open_connections() <= status.size(), "step {step}: leaked connection");
    }

    pool.dispose()?;
    assert_eq!(connector.open_connections(), 0);
    Ok(())
}

#[test]
fn random_workloads_keep_pool_invariants() -> Result<(), PoolError> {
    for seed in [1, 7, 42, 1_234, 99_991] {
        run_seed(seed)?;
    }
    Ok(())
}

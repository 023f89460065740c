use std::collections::HashSet;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use sql_keyed_pool::test_utils::MockConnector;
use sql_keyed_pool::{CheckinOptions, ConnectParams, Pool, PoolConfig, PoolError, SharedPool};

const THREADS: usize = 8;
const ITERATIONS: usize = 200;
const MAX_CONN: usize = 4;

fn assert_sync<T: Sync>() {}

#[test]
fn shared_pool_is_sync() {
    assert_sync::<SharedPool<MockConnector>>();
}

#[test]
fn concurrent_borrowers_never_share_a_connection() -> Result<(), PoolError> {
    let connector = MockConnector::new();
    let config = PoolConfig::builder(ConnectParams::Dsn("mock".into()))
        .max_conn(MAX_CONN)
        .expiration(Duration::from_secs(60))
        .build()?;
    let pool = Pool::exclusive(connector.clone(), config)?;
    let in_use = Mutex::new(HashSet::new());

    thread::scope(|scope| {
        for worker in 0..THREADS {
            let pool = &pool;
            let in_use = &in_use;
            scope.spawn(move || {
                let mut done = 0;
                while done < ITERATIONS {
                    let conn = match pool.checkout(None) {
                        Ok(conn) => conn,
                        Err(err) if err.is_exhausted() => {
                            thread::yield_now();
                            continue;
                        }
                        Err(err) => panic!("unexpected checkout error: {err}"),
                    };
                    assert!(
                        in_use.lock().unwrap().insert(conn.id()),
                        "{} handed to two borrowers",
                        conn.id()
                    );
                    assert!(pool.status().size() <= MAX_CONN);
                    if (worker + done) % 3 == 0 {
                        conn.lock().begin();
                    }
                    in_use.lock().unwrap().remove(&conn.id());
                    pool.checkin(conn, CheckinOptions::new())
                        .expect("checkin of a checked-out connection");
                    done += 1;
                }
            });
        }
    });

    let status = pool.status();
    assert_eq!(status.used, 0);
    assert!(status.free <= MAX_CONN);
    assert!(connector.connections_opened() <= MAX_CONN);
    Ok(())
}

#[test]
fn keyed_borrowers_on_separate_threads_get_separate_connections() -> Result<(), PoolError> {
    let connector = MockConnector::new();
    let config = PoolConfig::builder(ConnectParams::Dsn("mock".into()))
        .max_conn(THREADS)
        .build()?;
    let pool = Pool::exclusive(connector.clone(), config)?;

    let ids: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|worker| {
                let pool = &pool;
                scope.spawn(move || {
                    let key = format!("worker-{worker}");
                    let conn = pool.checkout(Some(key.clone().into())).expect("checkout");
                    let again = pool.checkout(Some(key.into())).expect("re-checkout");
                    assert_eq!(conn.id(), again.id());
                    conn.id()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect()
    });

    let distinct: HashSet<_> = ids.iter().collect();
    assert_eq!(distinct.len(), THREADS);
    assert_eq!(pool.status().used, THREADS);
    pool.dispose()?;
    assert_eq!(connector.open_connections(), 0);
    Ok(())
}

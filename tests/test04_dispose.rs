mod common;

use sql_keyed_pool::{CheckinOptions, PoolError};

use common::shared_pool;

#[test]
fn dispose_closes_free_and_used_connections() -> Result<(), PoolError> {
    let (pool, connector, _clock) = shared_pool(3, 60);

    let held = pool.checkout(None)?;
    let returned = pool.checkout(None)?;
    pool.checkin(returned, CheckinOptions::new())?;

    pool.dispose()?;

    assert!(pool.is_disposed());
    assert_eq!(connector.open_connections(), 0);
    let status = pool.status();
    assert!(status.disposed);
    assert_eq!(status.size(), 0);

    assert!(matches!(pool.checkout(None), Err(PoolError::Disposed)));
    assert!(matches!(
        pool.checkin(held.clone(), CheckinOptions::new()),
        Err(PoolError::Disposed)
    ));
    pool.checkin(held, CheckinOptions::new().fail_silently())?;
    Ok(())
}

#[test]
fn second_dispose_fails() -> Result<(), PoolError> {
    let (pool, _connector, _clock) = shared_pool(1, 60);
    pool.dispose()?;
    let err = pool.dispose().unwrap_err();
    assert!(err.is_disposed());
    Ok(())
}

#[test]
fn close_failures_do_not_stop_dispose() -> Result<(), PoolError> {
    let (pool, connector, _clock) = shared_pool(3, 60);

    let a = pool.checkout(None)?;
    let _b = pool.checkout(None)?;
    a.lock().probe().fail_close(true);

    pool.dispose()?;

    let failing = connector.probe(1).expect("first");
    let healthy = connector.probe(2).expect("second");
    assert_eq!(failing.close_calls(), 1);
    assert!(!failing.is_closed());
    assert!(healthy.is_closed());
    assert!(pool.is_disposed());
    Ok(())
}

#[test]
fn busy_connection_is_closed_when_checked_in_after_dispose() -> Result<(), PoolError> {
    let (pool, connector, _clock) = shared_pool(3, 60);

    let busy = pool.checkout(None)?;
    let also_busy = pool.checkout(None)?;
    let _idle = pool.checkout(None)?;
    {
        let _in_use = busy.lock();
        let _also_in_use = also_busy.lock();
        pool.dispose()?;
    }

    assert_eq!(connector.probe(1).expect("busy").close_calls(), 0);
    assert_eq!(connector.probe(2).expect("also busy").close_calls(), 0);
    assert!(connector.probe(3).expect("idle").is_closed());
    assert_eq!(connector.open_connections(), 2);

    pool.checkin(busy, CheckinOptions::new().fail_silently())?;
    assert_eq!(connector.probe(1).expect("busy").close_calls(), 1);

    let err = pool.checkin(also_busy, CheckinOptions::new()).unwrap_err();
    assert!(err.is_disposed());
    assert_eq!(connector.open_connections(), 0);
    Ok(())
}

#[test]
fn busy_connection_is_closed_when_pool_drops() -> Result<(), PoolError> {
    let (pool, connector, _clock) = shared_pool(2, 60);

    let busy = pool.checkout(None)?;
    {
        let _in_use = busy.lock();
        pool.dispose()?;
    }
    assert_eq!(connector.open_connections(), 1);

    drop(pool);
    assert_eq!(connector.open_connections(), 0);
    assert_eq!(busy.lock().probe().close_calls(), 1);
    Ok(())
}

#[test]
fn dropping_pool_closes_its_connections() -> Result<(), PoolError> {
    let (pool, connector, _clock) = shared_pool(2, 60);

    let conn = pool.checkout(None)?;
    pool.checkin(conn, CheckinOptions::new())?;
    let _held = pool.checkout(Some("held".into()))?;
    let _other = pool.checkout(None)?;
    assert_eq!(connector.open_connections(), 2);

    drop(pool);
    assert_eq!(connector.open_connections(), 0);
    Ok(())
}

#[test]
fn dropping_disposed_pool_is_harmless() -> Result<(), PoolError> {
    let (pool, connector, _clock) = shared_pool(2, 60);
    let _conn = pool.checkout(None)?;
    pool.dispose()?;
    drop(pool);
    assert_eq!(connector.probe(1).expect("first").close_calls(), 1);
    Ok(())
}

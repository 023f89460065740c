use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use sql_keyed_pool::test_utils::MockConnector;
use sql_keyed_pool::{
    CheckinOptions, ConnectParams, Key, LocalPool, ManualClock, Pool, PoolConfig, PoolError,
    TransactionStatus,
};

use crate::args::SimConfig;
use crate::logging::EventLog;
use crate::model::{Op, TaskState};
use crate::oracle::Oracle;
use crate::scheduler::Scheduler;

#[derive(Debug, Default)]
pub(crate) struct Summary {
    pub(crate) steps: u64,
    pub(crate) time_ms: u64,
    pub(crate) opened: usize,
    pub(crate) exhausted: u64,
    pub(crate) connect_failures: u64,
}

struct Sim {
    pool: LocalPool<MockConnector>,
    connector: MockConnector,
    max_conn: usize,
    summary: Summary,
}

pub(crate) fn run(config: &SimConfig, rng: &mut ChaCha8Rng) -> Result<Summary, String> {
    let connector = MockConnector::new();
    let clock = ManualClock::new();
    let pool_config = PoolConfig::builder(ConnectParams::Dsn("sim".into()))
        .max_conn(config.max_conn)
        .expiration_secs(config.expiration_secs)
        .disable_pooling(config.disable_pooling)
        .build()
        .map_err(|err| err.to_string())?;
    let pool = Pool::with_clock(connector.clone(), pool_config, Arc::new(clock.clone()))
        .map_err(|err| err.to_string())?;
    let mut sim = Sim {
        pool,
        connector,
        max_conn: config.max_conn,
        summary: Summary::default(),
    };

    let mut tasks: Vec<TaskState> = (0..config.tasks).map(TaskState::new).collect();
    let mut scheduler = Scheduler::new(config.tasks, clock);
    let mut events = EventLog::new(config.first_steps, config.tail_steps);

    let max_steps = config.iterations.unwrap_or(u64::MAX);
    let max_time = config.duration_ms.unwrap_or(u64::MAX);

    let mut step: u64 = 0;
    while step < max_steps && scheduler.clock.now_ms <= max_time {
        let Some(task_id) = scheduler.next_ready(rng) else {
            break;
        };
        let op = next_op(&tasks[task_id], config, rng);
        let result = sim.apply(&mut tasks[task_id], &op, config, rng);

        if let Op::Sleep(ms) = op {
            scheduler.sleep(task_id, ms);
        } else {
            scheduler.mark_ready(task_id);
        }
        let conn_label = tasks[task_id]
            .conn
            .as_ref()
            .map_or_else(|| "-".to_string(), |conn| conn.id().to_string());
        let result_label = match &result {
            Ok(label) => label.clone(),
            Err(reason) => format!("VIOLATION({reason})"),
        };
        events.record(format!(
            "step={} time={}ms task={} op={} conn={} result={}",
            step,
            scheduler.clock.now_ms,
            task_id,
            format_op(&op),
            conn_label,
            result_label
        ));

        let checked = result.and_then(|_| Oracle::check(&tasks, &sim.pool, &sim.connector));
        if let Err(reason) = checked {
            events.dump_failure(&reason);
            return Err(reason);
        }
        scheduler.advance_time(rng.random_range(1..=20));
        step += 1;
    }

    if config.disable_pooling {
        // an unpooled connection belongs to its borrower; dispose cannot see it
        for task in &mut tasks {
            if let Some((conn, _)) = task.release() {
                sim.pool
                    .checkin(conn, CheckinOptions::new())
                    .map_err(|err| err.to_string())?;
            }
        }
    }
    sim.pool.dispose().map_err(|err| err.to_string())?;
    let leaked = sim.connector.open_connections();
    if leaked > 0 {
        let reason = format!("{leaked} connection(s) still open after dispose");
        events.dump_failure(&reason);
        return Err(reason);
    }

    sim.summary.steps = step;
    sim.summary.time_ms = scheduler.clock.now_ms;
    sim.summary.opened = sim.connector.connections_opened();
    Ok(sim.summary)
}

impl Sim {
    /// Apply one operation; `Ok` carries the log label, `Err` a violation.
    fn apply(
        &mut self,
        task: &mut TaskState,
        op: &Op,
        config: &SimConfig,
        rng: &mut ChaCha8Rng,
    ) -> Result<String, String> {
        match op {
            Op::Checkout | Op::CheckoutNamed => {
                let key = (*op == Op::CheckoutNamed).then(|| task.named_key());
                self.checkout(task, key, config, rng)
            }
            Op::Recheckout => {
                let (Some(conn), Some(key)) = (&task.conn, &task.key) else {
                    return Ok("skipped".to_string());
                };
                let again = self.pool.checkout(Some(key.clone())).map_err(|err| {
                    format!("task {} re-checkout under held key failed: {err}", task.id)
                })?;
                if again.id() != conn.id() {
                    return Err(format!(
                        "task {} re-checkout under {key} returned {} instead of {}",
                        task.id,
                        again.id(),
                        conn.id()
                    ));
                }
                Ok("Ok".to_string())
            }
            Op::Return | Op::ReturnClose => {
                let Some((conn, key)) = task.release() else {
                    return Ok("skipped".to_string());
                };
                let mut options = CheckinOptions::new();
                if let Some(key) = key.filter(|_| rng.random_bool(0.5)) {
                    options = options.key(key);
                }
                if *op == Op::ReturnClose {
                    options = options.close();
                }
                self.pool
                    .checkin(conn, options)
                    .map(|()| "Ok".to_string())
                    .map_err(|err| format!("task {} checkin failed: {err}", task.id))
            }
            Op::Begin => {
                if let Some(conn) = &task.conn {
                    conn.lock().begin();
                    task.in_tx = true;
                }
                Ok("Ok".to_string())
            }
            Op::Commit => {
                if let Some(conn) = &task.conn {
                    conn.lock().commit();
                    task.in_tx = false;
                }
                Ok("Ok".to_string())
            }
            Op::Fail => {
                if let Some(conn) = &task.conn {
                    conn.lock().probe().set_status(TransactionStatus::Error);
                }
                Ok("Ok".to_string())
            }
            Op::Sever => {
                if let Some(conn) = &task.conn {
                    conn.lock().probe().sever();
                }
                Ok("Ok".to_string())
            }
            Op::LoseStatus => {
                if let Some(conn) = &task.conn {
                    conn.lock().probe().set_status(TransactionStatus::Unknown);
                }
                Ok("Ok".to_string())
            }
            Op::Purge => {
                self.pool.purge_expired();
                Ok(format!("free={}", self.pool.status().free))
            }
            Op::Sleep(_) => Ok("Ok".to_string()),
        }
    }

    fn checkout(
        &mut self,
        task: &mut TaskState,
        key: Option<Key>,
        config: &SimConfig,
        rng: &mut ChaCha8Rng,
    ) -> Result<String, String> {
        let before = self.pool.status();
        let inject = rng.random::<f64>() < config.connect_fail_rate;
        if inject {
            self.connector.fail_next_connects(1);
        }
        let outcome = self.pool.checkout(key);
        if inject {
            // a reuse never reaches the connector; drop the pending failure
            self.connector.fail_next_connects(0);
        }

        match outcome {
            Ok(conn) => {
                let (closed, status) = {
                    let guard = conn.lock();
                    let probe = guard.probe();
                    (probe.is_closed(), probe.status())
                };
                Oracle::check_fresh_checkout(task.id, conn.id(), closed, status)?;
                task.key = self.pool.key_of(&conn);
                task.conn = Some(conn);
                Ok("Ok".to_string())
            }
            Err(PoolError::Exhausted { .. }) if !before.pooling_disabled => {
                self.summary.exhausted += 1;
                Oracle::check_exhausted(task.id, before.used, before.free, self.max_conn)?;
                Ok("Exhausted".to_string())
            }
            Err(PoolError::ConnectFailure(_)) if inject => {
                self.summary.connect_failures += 1;
                Ok("ConnectFailure".to_string())
            }
            Err(err) => Err(format!("task {} unexpected checkout error: {err}", task.id)),
        }
    }
}

fn next_op(task: &TaskState, config: &SimConfig, rng: &mut ChaCha8Rng) -> Op {
    if rng.random::<f64>() < config.sleep_rate {
        return Op::Sleep(rng.random_range(1..=config.expiration_secs.max(1) * 1_000));
    }
    if rng.random::<f64>() < config.purge_rate {
        return Op::Purge;
    }

    let Some(conn) = &task.conn else {
        if rng.random::<f64>() < config.named_key_rate {
            return Op::CheckoutNamed;
        }
        return Op::Checkout;
    };
    if conn.lock().probe().is_closed() {
        return Op::Return;
    }

    if rng.random::<f64>() < config.fault_rate {
        let faults = [(Op::Sever, 0.3), (Op::LoseStatus, 0.3), (Op::Fail, 0.4)];
        return choose_weighted(&faults, rng);
    }

    let recheckout = if config.disable_pooling { 0.0 } else { 0.10 };
    if task.in_tx {
        let weights = [
            (Op::Commit, 0.45),
            (Op::Return, 0.30),
            (Op::Recheckout, recheckout),
            (Op::ReturnClose, 0.05),
        ];
        return choose_weighted(&weights, rng);
    }

    let weights = [
        (Op::Begin, 0.35),
        (Op::Return, 0.45),
        (Op::Recheckout, recheckout),
        (Op::ReturnClose, 0.05),
    ];
    choose_weighted(&weights, rng)
}

fn choose_weighted(items: &[(Op, f64)], rng: &mut ChaCha8Rng) -> Op {
    let total: f64 = items.iter().map(|(_, weight)| weight.max(0.0)).sum();
    if total <= f64::EPSILON {
        return items
            .first()
            .map_or(Op::Sleep(1), |(op, _)| op.clone());
    }
    let mut target = rng.random::<f64>() * total;
    for (op, weight) in items {
        let w = weight.max(0.0);
        if target <= w {
            return op.clone();
        }
        target -= w;
    }
    items.last().map_or(Op::Sleep(1), |(op, _)| op.clone())
}

fn format_op(op: &Op) -> String {
    match op {
        Op::Sleep(ms) => format!("Sleep({ms}ms)"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config(disable_pooling: bool) -> SimConfig {
        SimConfig {
            duration_ms: None,
            iterations: Some(3_000),
            seed: 11,
            max_conn: 3,
            tasks: 6,
            expiration_secs: 1,
            named_key_rate: 0.3,
            fault_rate: 0.05,
            connect_fail_rate: 0.05,
            sleep_rate: 0.05,
            purge_rate: 0.05,
            disable_pooling,
            log: None,
            preset: None,
            first_steps: 5,
            tail_steps: 20,
        }
    }

    #[test]
    fn seeded_runs_hold_invariants() {
        for seed in [1, 2, 3] {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let summary = run(&config(false), &mut rng).expect("no invariant violation");
            assert_eq!(summary.steps, 3_000);
            assert!(summary.opened > 0);
        }
    }

    #[test]
    fn contention_produces_exhaustion() {
        let mut cfg = config(false);
        cfg.sleep_rate = 0.0;
        cfg.purge_rate = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let summary = run(&cfg, &mut rng).expect("no invariant violation");
        assert!(summary.exhausted > 0);
    }

    #[test]
    fn disabled_pooling_run_leaks_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        run(&config(true), &mut rng).expect("no invariant violation");
    }

    #[test]
    fn weighted_choice_skips_zero_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let items = [(Op::Begin, 0.0), (Op::Commit, 1.0)];
        for _ in 0..50 {
            assert_eq!(choose_weighted(&items, &mut rng), Op::Commit);
        }
    }
}

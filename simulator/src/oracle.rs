use std::collections::HashMap;

use sql_keyed_pool::test_utils::MockConnector;
use sql_keyed_pool::{ConnId, LocalPool, TransactionStatus};

use crate::model::TaskState;

pub(crate) struct Oracle;

impl Oracle {
    /// Pool-wide invariants, checked after every step.
    pub(crate) fn check(
        tasks: &[TaskState],
        pool: &LocalPool<MockConnector>,
        connector: &MockConnector,
    ) -> Result<(), String> {
        let status = pool.status();
        if status.size() > status.max_conn {
            return Err(format!(
                "pool holds {} connections with max_conn {}",
                status.size(),
                status.max_conn
            ));
        }

        let mut seen: HashMap<ConnId, usize> = HashMap::new();
        for task in tasks {
            let Some(conn) = &task.conn else {
                if task.in_tx {
                    return Err(format!("task {} in tx without conn", task.id));
                }
                continue;
            };
            if let Some(other) = seen.insert(conn.id(), task.id) {
                return Err(format!(
                    "{} checked out by tasks {other} and {}",
                    conn.id(),
                    task.id
                ));
            }
            if status.pooling_disabled {
                continue;
            }
            let owner = pool.key_of(conn);
            if owner != task.key {
                return Err(format!(
                    "task {} holds {} under {:?} but the pool says {:?}",
                    task.id,
                    conn.id(),
                    task.key,
                    owner
                ));
            }
        }

        if !status.pooling_disabled && status.used != seen.len() {
            return Err(format!(
                "pool tracks {} checked-out connections, tasks hold {}",
                status.used,
                seen.len()
            ));
        }
        if !status.pooling_disabled && connector.open_connections() > status.size() {
            return Err(format!(
                "{} open connections but the pool accounts for {}",
                connector.open_connections(),
                status.size()
            ));
        }
        Ok(())
    }

    /// A connection fresh from checkout must be open and idle. Closing is
    /// permanent for mock connections, so this also rules out reuse after close.
    pub(crate) fn check_fresh_checkout(
        task_id: usize,
        conn_id: ConnId,
        closed: bool,
        status: TransactionStatus,
    ) -> Result<(), String> {
        if closed {
            return Err(format!("task {task_id} got closed {conn_id}"));
        }
        if status != TransactionStatus::Idle {
            return Err(format!("task {task_id} got {conn_id} in state {status:?}"));
        }
        Ok(())
    }

    /// Exhaustion is only legal when every slot is checked out.
    pub(crate) fn check_exhausted(
        task_id: usize,
        used_before: usize,
        free_before: usize,
        max_conn: usize,
    ) -> Result<(), String> {
        if used_before < max_conn || free_before > 0 {
            return Err(format!(
                "task {task_id} saw Exhausted with used={used_before} free={free_before} max={max_conn}"
            ));
        }
        Ok(())
    }
}

use sql_keyed_pool::test_utils::MockConnection;
use sql_keyed_pool::{ConnHandle, Key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    /// Check out under a generated key.
    Checkout,
    /// Check out under the task's own named key.
    CheckoutNamed,
    /// Check out again under the key already held.
    Recheckout,
    Return,
    ReturnClose,
    Begin,
    Commit,
    /// Statement failure inside a transaction.
    Fail,
    /// Server ends the session.
    Sever,
    /// Driver loses track of the session state.
    LoseStatus,
    Purge,
    Sleep(u64),
}

#[derive(Debug, Clone)]
pub(crate) struct TaskState {
    pub(crate) id: usize,
    pub(crate) conn: Option<ConnHandle<MockConnection>>,
    pub(crate) key: Option<Key>,
    pub(crate) in_tx: bool,
}

impl TaskState {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            conn: None,
            key: None,
            in_tx: false,
        }
    }

    pub(crate) fn named_key(&self) -> Key {
        Key::Named(format!("task-{}", self.id))
    }

    pub(crate) fn release(&mut self) -> Option<(ConnHandle<MockConnection>, Option<Key>)> {
        self.in_tx = false;
        let conn = self.conn.take()?;
        Some((conn, self.key.take()))
    }
}

use std::fmt;

use serde::Serialize;

/// Names the borrower slot a checked-out connection belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Key {
    /// Numeric key; the pool generates these when the caller supplies none.
    Auto(u64),
    /// Caller-chosen key.
    Named(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Auto(n) => write!(f, "{n}"),
            Key::Named(name) => f.write_str(name),
        }
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Key::Auto(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Named(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Named(value)
    }
}

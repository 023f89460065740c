//! Destination for the pool's debug trace.
//!
//! Warnings about swallowed failures always go through `tracing`. The sink
//! only decides where the lifecycle trace (created, reused, purged, closed)
//! is written.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

/// Selected once at configuration time.
#[derive(Clone, Default)]
pub enum LogSink {
    #[default]
    Disabled,
    /// `tracing::debug!` records under the `sql_keyed_pool` target.
    Structured,
    /// Plain `[pid:thread] message` lines.
    Raw(RawSink),
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Structured => f.write_str("Structured"),
            Self::Raw(_) => f.debug_tuple("Raw").field(&"<writer>").finish(),
        }
    }
}

impl LogSink {
    #[must_use]
    pub fn raw<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::Raw(RawSink::new(writer))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub(crate) fn emit(&self, args: fmt::Arguments<'_>) {
        match self {
            Self::Disabled => {}
            Self::Structured => {
                let current = thread::current();
                tracing::debug!(
                    target: "sql_keyed_pool",
                    pid = std::process::id(),
                    thread = current.name().unwrap_or("<unnamed>"),
                    "{}",
                    args
                );
            }
            Self::Raw(sink) => sink.write_line(args),
        }
    }
}

/// Shared writer behind a mutex so lines from different threads never interleave.
#[derive(Clone)]
pub struct RawSink {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl RawSink {
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    #[must_use]
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    fn write_line(&self, args: fmt::Arguments<'_>) {
        let current = thread::current();
        let name = current.name().unwrap_or("<unnamed>");
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        // a failing log write must never fail a pool operation
        let _ = writeln!(writer, "[{}:{}] {}", std::process::id(), name, args);
        let _ = writer.flush();
    }
}

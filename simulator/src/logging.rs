use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::writer::MakeWriter;

/// Tees log output to stdout and, optionally, a file.
#[derive(Clone)]
pub(crate) struct LogWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl LogWriter {
    pub(crate) fn new(path: Option<PathBuf>) -> io::Result<Self> {
        let file = match path {
            Some(path) => Some(Arc::new(Mutex::new(File::create(path)?))),
            None => None,
        };
        Ok(Self { file })
    }
}

pub(crate) struct LogWriterGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriterGuard {
            file: self.file.clone(),
        }
    }
}

impl Write for LogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &self.file {
            file.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &self.file {
            file.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        }
        Ok(())
    }
}

/// Keeps the first few steps and a rolling tail, so a failure report shows
/// both how the run started and what led up to the violation.
pub(crate) struct EventLog {
    first: Vec<String>,
    first_cap: usize,
    tail: VecDeque<String>,
    tail_cap: usize,
    dropped: u64,
}

impl EventLog {
    pub(crate) fn new(first_cap: usize, tail_cap: usize) -> Self {
        Self {
            first: Vec::with_capacity(first_cap),
            first_cap,
            tail: VecDeque::with_capacity(tail_cap),
            tail_cap,
            dropped: 0,
        }
    }

    pub(crate) fn record(&mut self, event: String) {
        tracing::debug!("{event}");
        if self.first.len() < self.first_cap {
            self.first.push(event);
            return;
        }
        if self.tail_cap == 0 {
            self.dropped += 1;
            return;
        }
        if self.tail.len() == self.tail_cap {
            self.tail.pop_front();
            self.dropped += 1;
        }
        self.tail.push_back(event);
    }

    pub(crate) fn dump_failure(&self, reason: &str) {
        tracing::error!("invariant violated: {reason}");
        for event in &self.first {
            tracing::error!("  {event}");
        }
        if self.dropped > 0 {
            tracing::error!("  ... {} step(s) omitted ...", self.dropped);
        }
        for event in &self.tail {
            tracing::error!("  {event}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_keeps_head_and_tail() {
        let mut log = EventLog::new(2, 3);
        for step in 0..10 {
            log.record(format!("step={step}"));
        }
        assert_eq!(log.first, vec!["step=0", "step=1"]);
        assert_eq!(
            log.tail.iter().cloned().collect::<Vec<_>>(),
            vec!["step=7", "step=8", "step=9"]
        );
        assert_eq!(log.dropped, 5);
    }
}

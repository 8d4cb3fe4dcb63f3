use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crate::event::LogEvent;

/// Destination for emitted events.
pub trait EventSink: Send + Sync {
    /// Write one event. Each call must produce exactly one line, flushed
    /// before returning.
    fn emit(&self, event: &LogEvent) -> std::io::Result<()>;
}

/// Line rendering for [`StdoutSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineFormat {
    /// One JSON object per line (machine-parseable).
    #[default]
    Json,
    /// `[source] type step: message` for humans.
    Pretty,
}

/// Writes events to standard output, one line each, flushed immediately.
///
/// The stdout lock is held for the whole write so lines from concurrent
/// workers never interleave.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink {
    format: LineFormat,
}

impl StdoutSink {
    pub fn new(format: LineFormat) -> Self {
        Self { format }
    }
}

impl EventSink for StdoutSink {
    fn emit(&self, event: &LogEvent) -> std::io::Result<()> {
        let line = match self.format {
            LineFormat::Json => event.to_json_line(),
            LineFormat::Pretty => event.to_pretty_line(),
        };
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        out.flush()
    }
}

/// Keeps every event in memory. Used by tests and embedders that render
/// events themselves.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events in emission order.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events whose source starts with `label`.
    pub fn from_label(&self, label: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.source.starts_with(label))
            .collect()
    }

    /// Step names in emission order for events whose source starts with `label`.
    pub fn steps_of(&self, label: &str) -> Vec<String> {
        self.from_label(label)
            .into_iter()
            .map(|event| event.payload.step)
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &LogEvent) -> std::io::Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

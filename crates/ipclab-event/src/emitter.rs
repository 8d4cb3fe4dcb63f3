use std::sync::Arc;

use tracing::warn;

use crate::event::{EventKind, LogEvent};
use crate::identity::WorkerIdentity;
use crate::sink::EventSink;

/// How a worker ended, as reported by its terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed { step: String, reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Formats events for one worker and hands them to a sink.
///
/// The terminal methods [`complete`](Self::complete) and
/// [`fail`](Self::fail) consume the emitter, so a worker emits at most one
/// terminal event.
pub struct EventEmitter {
    identity: WorkerIdentity,
    sink: Arc<dyn EventSink>,
}

impl EventEmitter {
    pub fn new(identity: WorkerIdentity, sink: Arc<dyn EventSink>) -> Self {
        Self { identity, sink }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn status(&self, step: &str, message: impl Into<String>) {
        self.emit(self.event(EventKind::Status, step, message));
    }

    pub fn log(&self, step: &str, message: impl Into<String>) {
        self.emit(self.event(EventKind::Log, step, message));
    }

    /// Log a step that carries data, e.g. a message sent or a value read.
    pub fn log_data(
        &self,
        step: &str,
        message: impl Into<String>,
        data: impl Into<String>,
        size_bytes: Option<u64>,
    ) {
        self.emit(self.event(EventKind::Log, step, message).with_data(data, size_bytes));
    }

    /// Emit the terminal success event.
    pub fn complete(self, step: &str, message: impl Into<String>) -> Outcome {
        self.status(step, message);
        Outcome::Completed
    }

    /// Emit the terminal error event.
    pub fn fail(self, step: &str, message: impl Into<String>) -> Outcome {
        let reason = message.into();
        self.emit(self.event(EventKind::Error, step, reason.clone()));
        Outcome::Failed {
            step: step.to_string(),
            reason,
        }
    }

    fn event(&self, kind: EventKind, step: &str, message: impl Into<String>) -> LogEvent {
        LogEvent::new(self.identity.to_string(), kind, step, message)
    }

    fn emit(&self, event: LogEvent) {
        if let Err(err) = self.sink.emit(&event) {
            warn!(source = %self.identity, step = event.step(), error = %err, "failed to emit event");
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("identity", &self.identity)
            .finish()
    }
}

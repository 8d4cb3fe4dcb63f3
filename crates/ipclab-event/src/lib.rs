//! Structured event stream for IPC workers.
//!
//! Every communication step a worker takes becomes one [`LogEvent`], written
//! as a single JSON line and flushed immediately so an external consumer can
//! route it to the right display lane by its `source`.

pub mod emitter;
pub mod event;
pub mod identity;
pub mod sink;

pub use emitter::{EventEmitter, Outcome};
pub use event::{Attachment, EventKind, LogEvent, Payload};
pub use identity::WorkerIdentity;
pub use sink::{EventSink, LineFormat, RecordingSink, StdoutSink};

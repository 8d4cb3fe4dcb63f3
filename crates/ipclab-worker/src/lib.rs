//! Worker protocols and supervision.
//!
//! Each transport runs a two-party conversation between workers on
//! independent OS threads:
//! - [`pipes`]: ping-pong over a duplex pipe, terminated by the `"FIM"` sentinel
//! - [`sockets`]: TCP echo server and client on loopback
//! - [`shared_memory`]: turn-passing counter or one-shot message over a shared buffer
//!
//! The [`Supervisor`] builds the transport, spawns both workers, joins them
//! and escalates from cooperative cancellation to forced shutdown.

pub mod cancel;
pub mod config;
pub mod error;
pub mod pipes;
pub mod shared_memory;
pub mod sockets;
pub mod supervisor;

pub use cancel::Cancellation;
pub use config::{
    DemoConfig, PipeConfig, ShmConfig, ShmMode, SocketConfig, SupervisorConfig, DEFAULT_MESSAGE,
};
pub use error::{failure_step, Result, WorkerError};
pub use supervisor::{ConversationResult, ShutdownHandle, Supervisor, TransportKind, WorkerReport};

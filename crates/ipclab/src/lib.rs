//! Two-party IPC demonstrations over pipes, sockets and shared memory.
//!
//! Every conversation runs two workers that report each protocol step as a
//! JSON event line, so the transports can be compared side by side.
//!
//! # Crate Structure
//!
//! - [`transport`]: pipe, TCP and shared-memory primitives
//! - [`event`]: structured event lines and sinks
//! - [`worker`]: conversation protocols and the supervisor

/// Re-export transport types.
pub mod transport {
    pub use ipclab_transport::*;
}

/// Re-export event types.
pub mod event {
    pub use ipclab_event::*;
}

/// Re-export worker protocols and supervision.
pub mod worker {
    pub use ipclab_worker::*;
}

//! Two-party IPC transports.
//!
//! Three transports, each created as one unit and split between exactly two
//! workers:
//! - [`PipeChannel`]: anonymous duplex byte stream with message framing
//! - [`SocketServer`] / [`SocketConnection`]: TCP request/response on loopback
//! - [`SharedBuffer`]: fixed-size shared mapping guarded by a lock and a turn flag
//!
//! This is the lowest layer of ipclab. Protocols and supervision live in
//! `ipclab-worker`.

pub mod error;
pub mod frame;
pub mod tcp;

#[cfg(unix)]
pub mod pipe;
#[cfg(unix)]
pub mod shm;

pub use error::{Result, TransportError};
pub use frame::{FrameConfig, FrameReader, FrameWriter, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use tcp::{
    ConnectionState, ListenerWake, SocketConnection, SocketKill, SocketServer, DEFAULT_ADDR,
    DEFAULT_PORT, RECV_CHUNK,
};

#[cfg(unix)]
pub use pipe::{PipeChannel, PipeEndpoint, PipeKill};
#[cfg(unix)]
pub use shm::{BufferGuard, SharedBuffer, TurnWait, WaitStrategy, WorkerId, SHM_CAPACITY};

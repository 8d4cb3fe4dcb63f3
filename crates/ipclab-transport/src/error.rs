use std::net::SocketAddr;

/// Errors that can occur in IPC transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Nobody is listening at the target address yet.
    #[error("connection refused by {addr}")]
    ConnectionRefused { addr: SocketAddr },

    /// Failed to connect for a reason other than refusal.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The local endpoint has already been closed.
    #[error("endpoint closed")]
    Closed,

    /// The far end closed its endpoint (end of stream).
    #[error("peer closed the connection")]
    PeerClosed,

    /// A stream socket cannot carry a zero-length message; the peer would
    /// never see it and both sides would wait forever.
    #[error("empty message cannot be sent over a stream socket")]
    EmptyMessage,

    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x494C \"IL\")")]
    InvalidMagic,

    /// The frame payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The message does not fit in the shared buffer; nothing was written.
    #[error("message of {size} bytes exceeds shared buffer capacity of {capacity} bytes")]
    CapacityExceeded { size: usize, capacity: usize },

    /// Waiting for the turn flag, the completion flag or a read timed out.
    #[error("timed out after {0:?} waiting for lock or turn")]
    LockOrWaitTimeout(std::time::Duration),

    /// A worker died while holding the shared buffer lock.
    #[error("shared buffer lock poisoned by a worker that died while holding it")]
    LockPoisoned,

    /// Failed to map the shared memory region.
    #[error("failed to map shared memory region: {0}")]
    Map(std::io::Error),

    /// The wait was abandoned because the conversation is shutting down.
    #[error("cancelled by supervisor")]
    Cancelled,
}

impl TransportError {
    /// True when the error means the far end went away rather than a local fault.
    pub fn is_peer_closed(&self) -> bool {
        match self {
            TransportError::PeerClosed => true,
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Map a read/write error, turning timeouts into [`TransportError::LockOrWaitTimeout`].
pub(crate) fn io_error(err: std::io::Error, timeout: Option<std::time::Duration>) -> TransportError {
    match (err.kind(), timeout) {
        (std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut, Some(timeout)) => {
            TransportError::LockOrWaitTimeout(timeout)
        }
        (
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted,
            _,
        ) => TransportError::PeerClosed,
        _ => TransportError::Io(err),
    }
}

use ipclab_transport::TransportError;

/// Errors that stop a conversation before its workers run.
///
/// Failures inside a worker never surface here; they become that worker's
/// terminal error event.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The shared transport object could not be created.
    #[error("transport setup failed: {0}")]
    Setup(#[from] TransportError),

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker {label}: {source}")]
    Spawn {
        label: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Terminal event step name for a transport failure.
pub fn failure_step(err: &TransportError) -> &'static str {
    match err {
        TransportError::PeerClosed => "peer_closed",
        TransportError::Closed => "closed",
        TransportError::ConnectionRefused { .. } => "connection_refused",
        TransportError::CapacityExceeded { .. } => "capacity_exceeded",
        TransportError::LockOrWaitTimeout(_) => "timeout",
        TransportError::LockPoisoned => "lock_poisoned",
        TransportError::Cancelled => "cancelled",
        TransportError::Bind { .. } => "bind_failed",
        TransportError::Connect { .. } => "connect_failed",
        TransportError::Accept(_) => "accept_failed",
        TransportError::EmptyMessage => "empty_message",
        TransportError::InvalidMagic | TransportError::PayloadTooLarge { .. } => "protocol_error",
        TransportError::Map(_) => "map_failed",
        io @ TransportError::Io(_) if io.is_peer_closed() => "peer_closed",
        TransportError::Io(_) => "io_error",
    }
}

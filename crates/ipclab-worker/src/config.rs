use std::net::SocketAddr;
use std::time::Duration;

use ipclab_transport::{TurnWait, DEFAULT_ADDR};

/// Message sent by the socket client and the shared-memory writer when the
/// caller supplies none.
pub const DEFAULT_MESSAGE: &str = "Hello, IPC world!";

/// Pipe conversation settings.
#[derive(Debug, Clone, Default)]
pub struct PipeConfig {
    /// Read timeout for each receive. `None` blocks until data or EOF.
    pub read_timeout: Option<Duration>,
}

/// Socket conversation settings.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Address the server binds and the client connects to.
    pub addr: SocketAddr,
    /// How long the client waits for the server to reach the listening
    /// state before connecting. A delay, not a handshake.
    pub ready_delay: Duration,
    /// Read timeout for each receive. `None` blocks until data or EOF.
    pub read_timeout: Option<Duration>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR,
            ready_delay: Duration::from_secs(1),
            read_timeout: None,
        }
    }
}

/// What the shared-memory workers exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShmMode {
    /// Both workers increment a counter, alternating turns for a fixed
    /// number of rounds.
    #[default]
    Counter,
    /// Worker 0 writes one message and signals completion; worker 1 reads it.
    Message,
}

impl ShmMode {
    /// Display-lane labels for worker 0 and worker 1.
    pub fn labels(self) -> [&'static str; 2] {
        match self {
            ShmMode::Counter => ["PROCESS 1", "PROCESS 2"],
            ShmMode::Message => ["WRITER", "READER"],
        }
    }
}

/// Shared-memory conversation settings.
#[derive(Debug, Clone)]
pub struct ShmConfig {
    pub mode: ShmMode,
    /// Exchanges per worker in counter mode.
    pub rounds: u32,
    /// Value placed in the buffer before the workers start (counter mode).
    pub seed: i64,
    /// Turn and completion wait behavior.
    pub wait: TurnWait,
}

impl Default for ShmConfig {
    fn default() -> Self {
        Self {
            mode: ShmMode::Counter,
            rounds: 5,
            seed: 100,
            wait: TurnWait::default(),
        }
    }
}

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between a shutdown request and forced termination.
    pub grace: Duration,
    /// How often the supervisor checks worker liveness.
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Complete configuration for one demonstration run.
#[derive(Debug, Clone, Default)]
pub struct DemoConfig {
    pub pipe: PipeConfig,
    pub socket: SocketConfig,
    pub shm: ShmConfig,
    pub supervisor: SupervisorConfig,
}

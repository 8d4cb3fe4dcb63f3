use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{io_error, Result, TransportError};

/// Fixed demonstration port. Above 1023 so no privileges are needed.
pub const DEFAULT_PORT: u16 = 65432;

/// Fixed demonstration address on the loopback interface.
pub const DEFAULT_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT));

/// Upper bound for a single receive. Messages are read in one shot; a
/// message fragmented by the network is not reassembled.
pub const RECV_CHUNK: usize = 1024;

/// Lifecycle of one side of a socket conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Listening,
    Connecting,
    Established,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Listening => "listening",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Established => "established",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Server side of the socket transport: a bound, listening TCP socket.
pub struct SocketServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl SocketServer {
    /// Bind and listen. On Unix, std sets `SO_REUSEADDR` so a quick rerun
    /// does not trip over `TIME_WAIT`.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening for tcp connections");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept one connection (blocking).
    pub fn accept(&self) -> Result<SocketConnection> {
        let (stream, remote) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%remote, "accepted tcp connection");
        SocketConnection::established(stream, remote)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::Listening
    }

    /// A handle that unblocks a pending `accept` by connecting to it.
    pub fn wake_handle(&self) -> ListenerWake {
        ListenerWake {
            addr: self.local_addr,
        }
    }
}

impl std::fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketServer")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// An established TCP conversation endpoint.
#[derive(Debug)]
pub struct SocketConnection {
    stream: TcpStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    state: ConnectionState,
    read_timeout: Option<Duration>,
}

impl SocketConnection {
    fn established(stream: TcpStream, remote_addr: SocketAddr) -> Result<Self> {
        let local_addr = stream.local_addr()?;
        Ok(Self {
            stream,
            local_addr,
            remote_addr,
            state: ConnectionState::Established,
            read_timeout: None,
        })
    }

    /// Connect to a listening server (blocking).
    ///
    /// A server that is not listening yet yields
    /// [`TransportError::ConnectionRefused`].
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        debug!(%addr, state = ConnectionState::Connecting.as_str(), "connecting");
        let stream = TcpStream::connect(addr).map_err(|source| match source.kind() {
            ErrorKind::ConnectionRefused => TransportError::ConnectionRefused { addr },
            _ => TransportError::Connect { addr, source },
        })?;
        stream.set_nodelay(true)?;
        Self::established(stream, addr)
    }

    /// Apply a read timeout to subsequent receives.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.read_timeout = timeout;
        Ok(())
    }

    /// Send the whole message. Empty messages are rejected with
    /// [`TransportError::EmptyMessage`].
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }
        if message.is_empty() {
            return Err(TransportError::EmptyMessage);
        }
        self.stream
            .write_all(message)
            .map_err(|err| io_error(err, None))?;
        self.stream.flush().map_err(|err| io_error(err, None))
    }

    /// One-shot read of at most `max` bytes.
    ///
    /// An empty result means the peer closed the connection; the state moves
    /// to [`ConnectionState::Closed`].
    pub fn receive(&mut self, max: usize) -> Result<Vec<u8>> {
        if self.state == ConnectionState::Closed {
            return Err(TransportError::Closed);
        }
        let mut buf = vec![0u8; max];
        let read = loop {
            match self.stream.read(&mut buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_error(err, self.read_timeout)),
            }
        };
        buf.truncate(read);
        if read == 0 {
            self.state = ConnectionState::Closed;
        }
        Ok(buf)
    }

    /// Signal end-of-stream to the peer while still allowing reads.
    pub fn shutdown_write(&mut self) -> Result<()> {
        self.stream.shutdown(Shutdown::Write)?;
        Ok(())
    }

    /// Close the connection in both directions.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            debug!(error = %err, "tcp shutdown on close failed");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// A handle that can force this connection closed from another thread.
    pub fn kill_switch(&self) -> Result<SocketKill> {
        Ok(SocketKill(self.stream.try_clone()?))
    }
}

/// Forced-shutdown handle for an established connection.
#[derive(Debug)]
pub struct SocketKill(TcpStream);

impl SocketKill {
    pub fn fire(&self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}

/// Wakes a listener blocked in `accept`.
#[derive(Debug, Clone, Copy)]
pub struct ListenerWake {
    addr: SocketAddr,
}

impl ListenerWake {
    pub fn fire(&self) {
        let _ = TcpStream::connect_timeout(&self.addr, Duration::from_millis(250));
    }
}

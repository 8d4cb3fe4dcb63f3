use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::frame::{FrameConfig, FrameReader, FrameWriter};

/// Anonymous duplex pipe created as one unit.
///
/// Backed by a connected `socketpair`, so both directions share one
/// descriptor per endpoint. Each endpoint is meant to be moved into exactly
/// one worker.
pub struct PipeChannel;

impl PipeChannel {
    /// Create a connected endpoint pair with default framing.
    pub fn create() -> Result<(PipeEndpoint, PipeEndpoint)> {
        Self::create_with_config(FrameConfig::default())
    }

    /// Create a connected endpoint pair with explicit framing configuration.
    pub fn create_with_config(config: FrameConfig) -> Result<(PipeEndpoint, PipeEndpoint)> {
        let (left, right) = UnixStream::pair()?;
        debug!("created duplex pipe");
        Ok((
            PipeEndpoint::from_stream(left, config.clone())?,
            PipeEndpoint::from_stream(right, config)?,
        ))
    }
}

/// One end of a [`PipeChannel`].
pub struct PipeEndpoint {
    reader: FrameReader<UnixStream>,
    writer: FrameWriter<UnixStream>,
    closed: bool,
}

impl PipeEndpoint {
    fn from_stream(stream: UnixStream, config: FrameConfig) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        reader_stream.set_read_timeout(config.read_timeout)?;
        Ok(Self {
            reader: FrameReader::with_config(reader_stream, config.clone()),
            writer: FrameWriter::with_config(stream, config),
            closed: false,
        })
    }

    /// Send one message to the peer.
    ///
    /// Fails with [`TransportError::Closed`] after [`close`](Self::close) and
    /// with [`TransportError::PeerClosed`] when the peer is gone.
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.writer.send(message)
    }

    /// Block until the next message arrives or the peer closes its end.
    pub fn receive(&mut self) -> Result<Bytes> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.reader.read_message()
    }

    /// Close both directions. The peer's next `receive` yields `PeerClosed`.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.writer.get_ref().shutdown(Shutdown::Both) {
            debug!(error = %err, "pipe shutdown on close failed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// A handle that can force this endpoint closed from another thread,
    /// unblocking a pending `receive`.
    pub fn kill_switch(&self) -> Result<PipeKill> {
        Ok(PipeKill(self.writer.get_ref().try_clone()?))
    }
}

impl Drop for PipeEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PipeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeEndpoint")
            .field("closed", &self.closed)
            .finish()
    }
}

/// Forced-shutdown handle for a pipe endpoint.
#[derive(Debug)]
pub struct PipeKill(UnixStream);

impl PipeKill {
    pub fn fire(&self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn messages_flow_both_ways() {
        let (mut left, mut right) = PipeChannel::create().unwrap();

        left.send(b"ping").unwrap();
        assert_eq!(right.receive().unwrap().as_ref(), b"ping");

        right.send(b"pong").unwrap();
        assert_eq!(left.receive().unwrap().as_ref(), b"pong");
    }

    #[test]
    fn message_boundaries_are_preserved() {
        let (mut left, mut right) = PipeChannel::create().unwrap();

        left.send(b"one").unwrap();
        left.send(b"").unwrap();
        left.send(b"three").unwrap();

        assert_eq!(right.receive().unwrap().as_ref(), b"one");
        assert!(right.receive().unwrap().is_empty());
        assert_eq!(right.receive().unwrap().as_ref(), b"three");
    }

    #[test]
    fn receive_after_peer_close_is_peer_closed() {
        let (mut left, mut right) = PipeChannel::create().unwrap();
        left.close();

        assert!(matches!(right.receive(), Err(TransportError::PeerClosed)));
    }

    #[test]
    fn dropping_an_endpoint_closes_it() {
        let (left, mut right) = PipeChannel::create().unwrap();
        drop(left);

        assert!(matches!(right.receive(), Err(TransportError::PeerClosed)));
    }

    #[test]
    fn local_use_after_close_is_closed() {
        let (mut left, _right) = PipeChannel::create().unwrap();
        left.close();

        assert!(left.is_closed());
        assert!(matches!(left.send(b"late"), Err(TransportError::Closed)));
        assert!(matches!(left.receive(), Err(TransportError::Closed)));
    }

    #[test]
    fn kill_switch_unblocks_pending_receive() {
        let (_left, mut right) = PipeChannel::create().unwrap();
        let kill = right.kill_switch().unwrap();

        let waiter = std::thread::spawn(move || right.receive());
        std::thread::sleep(Duration::from_millis(50));
        kill.fire();

        let result = waiter.join().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn read_timeout_maps_to_wait_timeout() {
        let config = FrameConfig {
            read_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let (_left, mut right) = PipeChannel::create_with_config(config).unwrap();

        assert!(matches!(
            right.receive(),
            Err(TransportError::LockOrWaitTimeout(_))
        ));
    }

    #[test]
    fn large_message_crosses_the_pipe() {
        let (mut left, mut right) = PipeChannel::create().unwrap();
        let payload = vec![0x5A; 256 * 1024];

        let expected = payload.clone();
        let reader = std::thread::spawn(move || right.receive().unwrap());
        left.send(&payload).unwrap();

        assert_eq!(reader.join().unwrap().as_ref(), expected.as_slice());
    }
}

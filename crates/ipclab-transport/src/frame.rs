//! Length-prefixed message framing for byte-stream transports.
//!
//! A pipe is a byte stream; messages need boundaries. Every message is
//! framed with:
//! - A 2-byte magic number ("IL") for stream synchronization
//! - A 4-byte little-endian payload length
//!
//! Callers always get complete messages, never partial reads.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{io_error, Result, TransportError};

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "IL" (0x49 0x4C).
pub const MAGIC: [u8; 2] = [0x49, 0x4C];

/// Default maximum payload size: whatever the length prefix can express.
pub const DEFAULT_MAX_PAYLOAD: usize = u32::MAX as usize;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Configuration for framed endpoints.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes.
    pub max_payload_size: usize,
    /// Read timeout for blocking receives. `None` blocks until data or EOF.
    pub read_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
        }
    }
}

/// Encode a message into the wire format.
///
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Payload         │
/// │ 0x49 0x4C    │ (4B LE)   │ (Length bytes)  │
/// └──────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(TransportError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if payload_len > max_payload {
        return Err(TransportError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Reads complete messages from any `Read` stream.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(TransportError::PeerClosed)` when EOF is reached, whether
    /// cleanly between messages or in the middle of one.
    pub fn read_message(&mut self) -> Result<Bytes> {
        loop {
            if let Some(payload) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                return Ok(payload);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_error(err, self.config.read_timeout)),
            };

            if read == 0 {
                return Err(TransportError::PeerClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }
}

/// Writes complete messages to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write a complete message (blocking).
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(TransportError::PeerClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_error(err, None)),
            }
        }

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(io_error(err, None)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn decode_waits_for_complete_frame() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        let full = buf.clone();

        buf.truncate(HEADER_SIZE + 2);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());

        let mut buf = full;
        let payload = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_rejects_invalid_magic() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(TransportError::InvalidMagic)));
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32_le(1024);

        let result = decode_frame(&mut buf, 16);
        assert!(matches!(
            result,
            Err(TransportError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }

    #[test]
    fn empty_payload_is_a_valid_message() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf).unwrap();
        let payload = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn reader_handles_byte_by_byte_stream() {
        let mut wire = BytesMut::new();
        encode_frame(b"slow", &mut wire).unwrap();
        encode_frame(b"and steady", &mut wire).unwrap();

        let mut reader = FrameReader::with_config(
            ByteByByteReader {
                bytes: wire.to_vec(),
                pos: 0,
            },
            FrameConfig::default(),
        );

        assert_eq!(reader.read_message().unwrap().as_ref(), b"slow");
        assert_eq!(reader.read_message().unwrap().as_ref(), b"and steady");
        assert!(matches!(
            reader.read_message(),
            Err(TransportError::PeerClosed)
        ));
    }

    #[test]
    fn reader_reports_peer_closed_mid_frame() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::with_config(Cursor::new(partial.to_vec()), FrameConfig::default());
        assert!(matches!(
            reader.read_message(),
            Err(TransportError::PeerClosed)
        ));
    }

    #[test]
    fn writer_enforces_max_payload() {
        let config = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Vec::new(), config);
        assert!(matches!(
            writer.send(b"too long"),
            Err(TransportError::PayloadTooLarge { size: 8, max: 4 })
        ));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn binary_payload_survives_framing() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let mut writer = FrameWriter::with_config(Vec::new(), FrameConfig::default());
        writer.send(&payload).unwrap();

        let mut reader = FrameReader::with_config(
            Cursor::new(writer.get_ref().clone()),
            FrameConfig::default(),
        );
        assert_eq!(reader.read_message().unwrap().as_ref(), payload.as_slice());
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }
}

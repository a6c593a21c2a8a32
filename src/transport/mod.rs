//! Byte transports consumed by protocol implementations.
//!
//! A [`Transport`] moves raw bytes; it knows nothing about fields or wire types.
//! Protocols sit on top of a transport and turn those bytes into primitives.
//!
//! # Key Components
//!
//! - [`MemoryBuffer`]: An in-memory, append-on-write / cursor-on-read byte store.
//! - [`SocketTransport`]: A TCP stream wrapped with an inbound [`MemoryBuffer`] so
//!   that reads never block the server loop.
//! - [`TcpServerSocket`]: Non-blocking [`Listener`] used by the server.
//! - [`TransportFactory`]: Turns an accepted connection into a transport.
//!
//! # Reads
//!
//! `read(n)` may return fewer than `n` bytes when fewer are available. Callers must
//! loop until they have what they need. An empty transport is reported as an error
//! rather than as a zero-length read.
use std::io;

use thiserror::Error;

mod memory;
mod socket;

pub use memory::MemoryBuffer;
pub use socket::{SocketTransport, SocketTransportFactory, TcpServerSocket};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(
        "memory buffer: could not read {requested} bytes from buffer. original length is {length}, \
         current index is {position}, buffer content <start>{dump}<end>"
    )]
    BufferUnderrun {
        requested: usize,
        length: usize,
        position: usize,
        dump: String,
    },

    #[error("transport is not open")]
    NotOpen,

    #[error("end of file")]
    EndOfFile,

    #[error("transport timed out")]
    TimedOut,

    #[error("no data ready")]
    WouldBlock,

    #[error("transport io error: {0}")]
    Io(#[source] io::Error),
}

impl TransportError {
    /// Whether the peer is gone; the server drops clients reporting these.
    pub fn is_disconnect(&self) -> bool {
        match self {
            TransportError::NotOpen | TransportError::EndOfFile | TransportError::TimedOut => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::WouldBlock => TransportError::WouldBlock,
            io::ErrorKind::TimedOut => TransportError::TimedOut,
            io::ErrorKind::UnexpectedEof => TransportError::EndOfFile,
            _ => TransportError::Io(value),
        }
    }
}

/// Bidirectional byte channel.
pub trait Transport {
    fn is_open(&self) -> bool;

    fn open(&mut self) -> Result<(), TransportError>;

    fn close(&mut self);

    /// Read up to `len` bytes. Returns at least one byte or an error.
    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError>;

    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Whether a read attempt is worthwhile right now.
    ///
    /// Transports without readiness information always report `true`. A
    /// transport whose peer hung up also reports `true` so the following read
    /// can observe the end of file.
    fn is_readable(&mut self) -> Result<bool, TransportError> {
        Ok(true)
    }
}

/// Transports holding their input in memory, allowing look-ahead and
/// returning bytes to the front of the stream.
pub trait BufferedTransport: Transport {
    fn available(&self) -> usize;

    fn peek(&self, len: usize, offset: usize) -> &[u8];

    fn put_back(&mut self, buf: &[u8]);
}

/// Source of incoming connections for the server loop.
pub trait Listener {
    type Connection;

    fn listen(&mut self) -> Result<(), TransportError>;

    /// Accept one pending connection without waiting; `None` when nothing is pending.
    fn accept(&mut self) -> Result<Option<Self::Connection>, TransportError>;

    fn close(&mut self) {}
}

/// Wraps an accepted connection in a transport.
pub trait TransportFactory<C> {
    type Transport: Transport;

    fn transport(&self, connection: C) -> Result<Self::Transport, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_transport_kinds() {
        let err: TransportError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(matches!(err, TransportError::WouldBlock));
        assert!(!err.is_disconnect());

        let err: TransportError = io::Error::from(io::ErrorKind::TimedOut).into();
        assert!(err.is_disconnect());

        let err: TransportError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(err.is_disconnect());

        let err: TransportError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(!err.is_disconnect());
    }
}

use std::{
    io::{self, Read, Write},
    mem,
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    time::Duration,
};

use log::{debug, trace};

use super::{Listener, MemoryBuffer, Transport, TransportError, TransportFactory};

const READ_CHUNK: usize = 16 * 1024;

/// TCP stream transport.
///
/// Incoming bytes are staged in a [`MemoryBuffer`]. In non-blocking mode every
/// byte handed out since the last readiness check is journaled; when a read finds
/// the socket drained mid-request, the journal is put back in front of the
/// buffer and the read fails with [`TransportError::WouldBlock`], so the whole
/// request is decoded again once the rest of it arrives. Output written during
/// the abandoned attempt is discarded with it.
#[derive(Debug)]
pub struct SocketTransport {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    inbound: MemoryBuffer,
    journal: Vec<u8>,
    outbound: Vec<u8>,
    /// Length of `outbound` when the current attempt started.
    committed: usize,
    eof: bool,
    blocking: bool,
}

impl SocketTransport {
    /// Non-blocking transport for the server loop.
    pub fn new(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self::wrap(stream, false))
    }

    /// Blocking transport; a read waiting longer than `timeout` fails with
    /// [`TransportError::TimedOut`].
    pub fn blocking(stream: TcpStream, timeout: Option<Duration>) -> Result<Self, TransportError> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(timeout)?;
        Ok(Self::wrap(stream, true))
    }

    fn wrap(stream: TcpStream, blocking: bool) -> Self {
        Self {
            peer: stream.peer_addr().ok(),
            stream: Some(stream),
            inbound: MemoryBuffer::new(),
            journal: Vec::new(),
            outbound: Vec::new(),
            committed: 0,
            eof: false,
            blocking,
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// One read from the socket into the inbound buffer. `Ok(0)` means the peer hung up.
    fn fill(&mut self) -> Result<usize, TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("peer {:?} closed the connection", self.peer);
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    trace!("received {n} bytes from {:?}", self.peer);
                    self.inbound.write(&chunk[..n])?;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if self.blocking && e.kind() == io::ErrorKind::WouldBlock => {
                    return Err(TransportError::TimedOut);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn rewind(&mut self) {
        if !self.journal.is_empty() {
            let consumed = mem::take(&mut self.journal);
            self.inbound.put_back(&consumed);
        }
        self.outbound.truncate(self.committed);
    }
}

impl Transport for SocketTransport {
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotOpen);
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.inbound.reset_buffer();
        self.journal.clear();
        self.outbound.clear();
        self.committed = 0;
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotOpen);
        }

        if self.inbound.available() == 0 {
            if self.eof {
                return Err(TransportError::EndOfFile);
            }
            match self.fill() {
                Ok(0) => return Err(TransportError::EndOfFile),
                Ok(_) => {}
                Err(TransportError::WouldBlock) => {
                    self.rewind();
                    return Err(TransportError::WouldBlock);
                }
                Err(e) => return Err(e),
            }
        }

        let bytes = self.inbound.read(len)?;
        if !self.blocking {
            self.journal.extend_from_slice(&bytes);
        }
        Ok(bytes)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotOpen);
        }
        self.outbound.extend_from_slice(buf);
        Ok(())
    }

    /// Push buffered output to the socket. In non-blocking mode whatever the
    /// socket does not take now stays buffered for the next flush.
    fn flush(&mut self) -> Result<(), TransportError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        while !self.outbound.is_empty() {
            match stream.write(&self.outbound) {
                Ok(0) => return Err(TransportError::EndOfFile),
                Ok(n) => {
                    self.outbound.drain(..n);
                    self.committed = self.committed.saturating_sub(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if !self.blocking && e.kind() == io::ErrorKind::WouldBlock => {
                    trace!("{} bytes pending for {:?}", self.outbound.len(), self.peer);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        stream.flush()?;
        Ok(())
    }

    fn is_readable(&mut self) -> Result<bool, TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotOpen);
        }

        // A new request attempt starts here; drop consumed bytes.
        self.journal.clear();
        self.inbound.put_back(&[]);
        self.flush()?;
        self.committed = self.outbound.len();

        if !self.eof {
            match self.fill() {
                Ok(_) | Err(TransportError::WouldBlock) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(self.inbound.available() > 0 || self.eof)
    }
}

/// Non-blocking TCP listener.
#[derive(Debug)]
pub struct TcpServerSocket {
    address: SocketAddr,
    listener: Option<TcpListener>,
}

impl TcpServerSocket {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            listener: None,
        }
    }

    /// Bound address; differs from the configured one when binding port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }
}

impl Listener for TcpServerSocket {
    type Connection = (TcpStream, SocketAddr);

    fn listen(&mut self) -> Result<(), TransportError> {
        if self.listener.is_some() {
            return Ok(());
        }
        let listener = TcpListener::bind(self.address)?;
        listener.set_nonblocking(true)?;
        self.listener = Some(listener);
        Ok(())
    }

    fn accept(&mut self) -> Result<Option<Self::Connection>, TransportError> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(TransportError::NotOpen);
        };

        match listener.accept() {
            Ok(connection) => Ok(Some(connection)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        self.listener = None;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SocketTransportFactory;

impl TransportFactory<(TcpStream, SocketAddr)> for SocketTransportFactory {
    type Transport = SocketTransport;

    fn transport(
        &self,
        (stream, address): (TcpStream, SocketAddr),
    ) -> Result<SocketTransport, TransportError> {
        debug!("accepted connection from {address}");
        SocketTransport::new(stream)
    }
}

//! In-memory transport buffer.
//!
//! Writes append to the end of the buffer, reads consume from a cursor. Consumed
//! bytes stay in the buffer until [`MemoryBuffer::put_back`] or
//! [`MemoryBuffer::reset_buffer`] discards them.
//!
//! # Example
//! ```rust
//! use fieldwire::transport::{MemoryBuffer, Transport};
//!
//! let mut buffer = MemoryBuffer::new();
//! buffer.write(b"abc").unwrap();
//!
//! // Short reads are not an error.
//! assert_eq!(buffer.read(5).unwrap(), b"abc");
//! // An empty buffer is.
//! assert!(buffer.read(1).is_err());
//! ```
use std::{cell::Cell, fmt::Write as _};

use super::{BufferedTransport, Transport, TransportError};

#[derive(Debug, Default, Clone)]
pub struct MemoryBuffer {
    buf: Vec<u8>,
    index: usize,
    length: Cell<Option<usize>>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(buf: impl Into<Vec<u8>>) -> Self {
        Self {
            buf: buf.into(),
            index: 0,
            length: Cell::new(None),
        }
    }

    fn length(&self) -> usize {
        match self.length.get() {
            Some(length) => length,
            None => {
                let length = self.buf.len();
                self.length.set(Some(length));
                length
            }
        }
    }

    /// Number of unread bytes.
    pub fn available(&self) -> usize {
        self.length() - self.index
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.index
    }

    /// Unread remainder of the buffer.
    pub fn get_buffer(&self) -> &[u8] {
        &self.buf[self.index..]
    }

    /// Bytes between `offset` and `offset + len` past the cursor, clamped to
    /// the end of the buffer.
    pub fn peek(&self, len: usize, offset: usize) -> &[u8] {
        let end = self.length();
        let start = self.index.saturating_add(offset).min(end);
        let stop = start.saturating_add(len).min(end);
        &self.buf[start..stop]
    }

    /// Put `buf` in front of the unread bytes and rewind the cursor.
    pub fn put_back(&mut self, buf: &[u8]) {
        if self.available() == 0 {
            self.buf = buf.to_vec();
        } else {
            let mut joined = Vec::with_capacity(buf.len() + self.available());
            joined.extend_from_slice(buf);
            joined.extend_from_slice(&self.buf[self.index..]);
            self.buf = joined;
        }
        self.length.set(None);
        self.index = 0;
    }

    pub fn reset_buffer(&mut self) {
        self.buf.clear();
        self.index = 0;
        self.length.set(None);
    }

    fn dump(&self) -> String {
        self.buf.iter().fold(String::with_capacity(self.buf.len() * 2), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
    }
}

impl Transport for MemoryBuffer {
    fn is_open(&self) -> bool {
        true
    }

    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {}

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        let available = self.available();
        if available == 0 {
            return Err(TransportError::BufferUnderrun {
                requested: len,
                length: self.length(),
                position: self.index,
                dump: self.dump(),
            });
        }

        let len = len.min(available);
        let out = self.peek(len, 0).to_vec();
        self.index += len;
        Ok(out)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.buf.extend_from_slice(buf);
        self.length.set(None);
        Ok(())
    }
}

impl BufferedTransport for MemoryBuffer {
    fn available(&self) -> usize {
        MemoryBuffer::available(self)
    }

    fn peek(&self, len: usize, offset: usize) -> &[u8] {
        MemoryBuffer::peek(self, len, offset)
    }

    fn put_back(&mut self, buf: &[u8]) {
        MemoryBuffer::put_back(self, buf)
    }
}

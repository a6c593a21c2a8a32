//! Wire protocols.
//!
//! A protocol turns the primitive values of a record (integers, strings, field
//! headers, container headers) into bytes on a [`Transport`], and back. It does
//! not know about record types; the [`codec`](crate::codec) walks the field tables
//! and calls into the protocol one primitive at a time.
//!
//! # Key Components
//!
//! - [`WireType`]: Tag carried by every field header describing how the value is encoded.
//! - [`Protocol`]: Object-safe trait with per-type read/write operations and a generic
//!   [`skip`](Protocol::skip) used to discard values nobody asked for.
//! - [`BinaryProtocol`]: Compact big-endian encoding backed by `bincode`.
//!
//! # Binary Format
//!
//! - Field header: one type byte followed by a big-endian `i16` field id.
//! - Stop marker: a single `0x00` type byte.
//! - Strings: big-endian `i32` byte length followed by UTF-8 bytes.
//! - Lists and sets: element type byte, then an `i32` element count.
//! - Maps: key type byte, value type byte, then an `i32` entry count.
//! - Struct boundaries and field ends produce no bytes.
//!
//! # Extensibility
//!
//! Skipping is driven purely by the wire type, so a reader can step over any value
//! it has no descriptor for. This is what lets independently deployed producers add
//! optional fields without breaking older consumers.
use std::string::FromUtf8Error;

use thiserror::Error;

use crate::transport::{Transport, TransportError};

mod binary;

pub use binary::{BinaryLimits, BinaryProtocol, BinaryProtocolFactory};

pub const DEFAULT_RECURSION_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Stop = 0,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TryFrom<u8> for WireType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WireType::Stop),
            2 => Ok(WireType::Bool),
            3 => Ok(WireType::Byte),
            4 => Ok(WireType::Double),
            6 => Ok(WireType::I16),
            8 => Ok(WireType::I32),
            10 => Ok(WireType::I64),
            11 => Ok(WireType::String),
            12 => Ok(WireType::Struct),
            13 => Ok(WireType::Map),
            14 => Ok(WireType::Set),
            15 => Ok(WireType::List),
            other => Err(ProtocolError::InvalidWireType(other)),
        }
    }
}

impl From<WireType> for u8 {
    fn from(value: WireType) -> Self {
        value as u8
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode value: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode value: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("invalid wire type {0}")]
    InvalidWireType(u8),

    #[error("negative size {0}")]
    NegativeSize(i32),

    #[error("size {size} exceeds limit {limit}")]
    SizeLimit { size: usize, limit: usize },

    #[error("invalid utf-8 in string: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("nesting deeper than {0} levels")]
    DepthLimit(usize),
}

impl ProtocolError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ProtocolError::Transport(e) if e.is_disconnect())
    }
}

/// Header preceding every field value.
///
/// Protocols that key fields by name report `id == 0` and set `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHeader {
    pub name: Option<String>,
    pub wire_type: WireType,
    pub id: i16,
}

impl FieldHeader {
    pub fn new(wire_type: WireType, id: i16) -> Self {
        Self {
            name: None,
            wire_type,
            id,
        }
    }

    pub fn named(name: impl Into<String>, wire_type: WireType) -> Self {
        Self {
            name: Some(name.into()),
            wire_type,
            id: 0,
        }
    }

    pub fn stop() -> Self {
        Self::new(WireType::Stop, 0)
    }
}

/// Header of a list or set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHeader {
    pub element: WireType,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub key: WireType,
    pub value: WireType,
    pub size: usize,
}

/// Primitive encoding over a transport.
///
/// Write operations return the number of bytes they produced.
pub trait Protocol {
    fn write_struct_begin(&mut self, name: &str) -> Result<usize, ProtocolError>;
    fn write_struct_end(&mut self) -> Result<usize, ProtocolError>;
    fn write_field_begin(
        &mut self,
        name: &str,
        wire_type: WireType,
        id: i16,
    ) -> Result<usize, ProtocolError>;
    fn write_field_end(&mut self) -> Result<usize, ProtocolError>;
    fn write_field_stop(&mut self) -> Result<usize, ProtocolError>;
    fn write_list_begin(&mut self, header: ListHeader) -> Result<usize, ProtocolError>;
    fn write_list_end(&mut self) -> Result<usize, ProtocolError>;
    fn write_set_begin(&mut self, header: ListHeader) -> Result<usize, ProtocolError>;
    fn write_set_end(&mut self) -> Result<usize, ProtocolError>;
    fn write_map_begin(&mut self, header: MapHeader) -> Result<usize, ProtocolError>;
    fn write_map_end(&mut self) -> Result<usize, ProtocolError>;
    fn write_bool(&mut self, value: bool) -> Result<usize, ProtocolError>;
    fn write_byte(&mut self, value: i8) -> Result<usize, ProtocolError>;
    fn write_i16(&mut self, value: i16) -> Result<usize, ProtocolError>;
    fn write_i32(&mut self, value: i32) -> Result<usize, ProtocolError>;
    fn write_i64(&mut self, value: i64) -> Result<usize, ProtocolError>;
    fn write_double(&mut self, value: f64) -> Result<usize, ProtocolError>;
    fn write_string(&mut self, value: &str) -> Result<usize, ProtocolError>;

    fn read_struct_begin(&mut self) -> Result<(), ProtocolError>;
    fn read_struct_end(&mut self) -> Result<(), ProtocolError>;
    fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError>;
    fn read_field_end(&mut self) -> Result<(), ProtocolError>;
    fn read_list_begin(&mut self) -> Result<ListHeader, ProtocolError>;
    fn read_list_end(&mut self) -> Result<(), ProtocolError>;
    fn read_set_begin(&mut self) -> Result<ListHeader, ProtocolError>;
    fn read_set_end(&mut self) -> Result<(), ProtocolError>;
    fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError>;
    fn read_map_end(&mut self) -> Result<(), ProtocolError>;
    fn read_bool(&mut self) -> Result<bool, ProtocolError>;
    fn read_byte(&mut self) -> Result<i8, ProtocolError>;
    fn read_i16(&mut self) -> Result<i16, ProtocolError>;
    fn read_i32(&mut self) -> Result<i32, ProtocolError>;
    fn read_i64(&mut self) -> Result<i64, ProtocolError>;
    fn read_double(&mut self) -> Result<f64, ProtocolError>;
    fn read_string(&mut self) -> Result<String, ProtocolError>;

    /// Underlying transport, used by the server to flush and close.
    fn transport_mut(&mut self) -> &mut dyn Transport;

    fn recursion_limit(&self) -> usize {
        DEFAULT_RECURSION_LIMIT
    }

    /// Read and discard one value of the given type.
    fn skip(&mut self, wire_type: WireType) -> Result<(), ProtocolError> {
        let limit = self.recursion_limit();
        skip_value(self, wire_type, limit)
    }
}

fn skip_value<P: Protocol + ?Sized>(
    protocol: &mut P,
    wire_type: WireType,
    depth: usize,
) -> Result<(), ProtocolError> {
    if depth == 0 {
        return Err(ProtocolError::DepthLimit(protocol.recursion_limit()));
    }

    match wire_type {
        WireType::Stop => {}
        WireType::Bool => {
            protocol.read_bool()?;
        }
        WireType::Byte => {
            protocol.read_byte()?;
        }
        WireType::Double => {
            protocol.read_double()?;
        }
        WireType::I16 => {
            protocol.read_i16()?;
        }
        WireType::I32 => {
            protocol.read_i32()?;
        }
        WireType::I64 => {
            protocol.read_i64()?;
        }
        WireType::String => {
            protocol.read_string()?;
        }
        WireType::Struct => {
            protocol.read_struct_begin()?;
            loop {
                let header = protocol.read_field_begin()?;
                if header.wire_type == WireType::Stop {
                    break;
                }
                skip_value(protocol, header.wire_type, depth - 1)?;
                protocol.read_field_end()?;
            }
            protocol.read_struct_end()?;
        }
        WireType::Map => {
            let header = protocol.read_map_begin()?;
            for _ in 0..header.size {
                skip_value(protocol, header.key, depth - 1)?;
                skip_value(protocol, header.value, depth - 1)?;
            }
            protocol.read_map_end()?;
        }
        WireType::Set => {
            let header = protocol.read_set_begin()?;
            for _ in 0..header.size {
                skip_value(protocol, header.element, depth - 1)?;
            }
            protocol.read_set_end()?;
        }
        WireType::List => {
            let header = protocol.read_list_begin()?;
            for _ in 0..header.size {
                skip_value(protocol, header.element, depth - 1)?;
            }
            protocol.read_list_end()?;
        }
    }
    Ok(())
}

/// Wraps a transport in a protocol.
pub trait ProtocolFactory<T: Transport> {
    type Protocol: Protocol;

    fn protocol(&self, transport: T) -> Self::Protocol;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_type_tags_round_trip() {
        for tag in 0..=u8::MAX {
            if let Ok(wire_type) = WireType::try_from(tag) {
                assert_eq!(u8::from(wire_type), tag);
            }
        }
        assert_eq!(u8::from(WireType::List), 15);
    }

    #[test]
    #[should_panic(expected = "InvalidWireType(1)")]
    fn void_is_not_a_wire_type() {
        WireType::try_from(1).unwrap();
    }

    #[test]
    fn disconnect_passes_through_protocol_errors() {
        let err = ProtocolError::from(TransportError::EndOfFile);
        assert!(err.is_disconnect());
        assert!(!ProtocolError::NegativeSize(-1).is_disconnect());
    }
}

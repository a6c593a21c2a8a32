use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_to_vec,
};

use crate::transport::{Transport, TransportError};

use super::{
    DEFAULT_RECURSION_LIMIT, FieldHeader, ListHeader, MapHeader, Protocol, ProtocolError,
    ProtocolFactory, WireType,
};

/// Upper bounds applied while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryLimits {
    pub string: usize,
    pub container: usize,
    pub recursion: usize,
}

impl Default for BinaryLimits {
    fn default() -> Self {
        Self {
            string: 16 * 1024 * 1024,
            container: 1024 * 1024,
            recursion: DEFAULT_RECURSION_LIMIT,
        }
    }
}

pub struct BinaryProtocol<T: Transport> {
    transport: T,
    config: Configuration<BigEndian, Fixint>,
    limits: BinaryLimits,
}

impl<T: Transport> BinaryProtocol<T> {
    pub fn new(transport: T) -> Self {
        Self::with_limits(transport, BinaryLimits::default())
    }

    pub fn with_limits(transport: T, limits: BinaryLimits) -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding();
        Self {
            transport,
            config,
            limits,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn put<E: Encode>(&mut self, value: E) -> Result<usize, ProtocolError> {
        let bytes = encode_to_vec(value, self.config)?;
        self.transport.write(&bytes)?;
        Ok(bytes.len())
    }

    /// Read exactly `len` bytes, tolerating short reads from the transport.
    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let chunk = self.transport.read(len - out.len())?;
            if chunk.is_empty() {
                return Err(TransportError::EndOfFile.into());
            }
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    fn take<D: Decode<()>>(&mut self, width: usize) -> Result<D, ProtocolError> {
        let bytes = self.read_exact(width)?;
        let (value, _) = decode_from_slice(&bytes, self.config)?;
        Ok(value)
    }

    fn read_wire_type(&mut self) -> Result<WireType, ProtocolError> {
        WireType::try_from(self.take::<u8>(1)?)
    }

    fn read_size(&mut self, limit: usize) -> Result<usize, ProtocolError> {
        let size = self.take::<i32>(4)?;
        let size = usize::try_from(size).map_err(|_| ProtocolError::NegativeSize(size))?;
        if size > limit {
            return Err(ProtocolError::SizeLimit { size, limit });
        }
        Ok(size)
    }

    fn write_size(&mut self, size: usize) -> Result<usize, ProtocolError> {
        let size = i32::try_from(size).map_err(|_| ProtocolError::SizeLimit {
            size,
            limit: i32::MAX as usize,
        })?;
        self.put(size)
    }

    fn read_list_header(&mut self) -> Result<ListHeader, ProtocolError> {
        let element = self.read_wire_type()?;
        let size = self.read_size(self.limits.container)?;
        Ok(ListHeader { element, size })
    }

    fn write_list_header(&mut self, header: ListHeader) -> Result<usize, ProtocolError> {
        Ok(self.put(u8::from(header.element))? + self.write_size(header.size)?)
    }
}

impl<T: Transport> Protocol for BinaryProtocol<T> {
    fn write_struct_begin(&mut self, _name: &str) -> Result<usize, ProtocolError> {
        Ok(0)
    }

    fn write_struct_end(&mut self) -> Result<usize, ProtocolError> {
        Ok(0)
    }

    fn write_field_begin(
        &mut self,
        _name: &str,
        wire_type: WireType,
        id: i16,
    ) -> Result<usize, ProtocolError> {
        Ok(self.put(u8::from(wire_type))? + self.put(id)?)
    }

    fn write_field_end(&mut self) -> Result<usize, ProtocolError> {
        Ok(0)
    }

    fn write_field_stop(&mut self) -> Result<usize, ProtocolError> {
        self.put(u8::from(WireType::Stop))
    }

    fn write_list_begin(&mut self, header: ListHeader) -> Result<usize, ProtocolError> {
        self.write_list_header(header)
    }

    fn write_list_end(&mut self) -> Result<usize, ProtocolError> {
        Ok(0)
    }

    fn write_set_begin(&mut self, header: ListHeader) -> Result<usize, ProtocolError> {
        self.write_list_header(header)
    }

    fn write_set_end(&mut self) -> Result<usize, ProtocolError> {
        Ok(0)
    }

    fn write_map_begin(&mut self, header: MapHeader) -> Result<usize, ProtocolError> {
        Ok(self.put(u8::from(header.key))?
            + self.put(u8::from(header.value))?
            + self.write_size(header.size)?)
    }

    fn write_map_end(&mut self) -> Result<usize, ProtocolError> {
        Ok(0)
    }

    fn write_bool(&mut self, value: bool) -> Result<usize, ProtocolError> {
        self.put(value)
    }

    fn write_byte(&mut self, value: i8) -> Result<usize, ProtocolError> {
        self.put(value)
    }

    fn write_i16(&mut self, value: i16) -> Result<usize, ProtocolError> {
        self.put(value)
    }

    fn write_i32(&mut self, value: i32) -> Result<usize, ProtocolError> {
        self.put(value)
    }

    fn write_i64(&mut self, value: i64) -> Result<usize, ProtocolError> {
        self.put(value)
    }

    fn write_double(&mut self, value: f64) -> Result<usize, ProtocolError> {
        self.put(value)
    }

    fn write_string(&mut self, value: &str) -> Result<usize, ProtocolError> {
        let written = self.write_size(value.len())?;
        self.transport.write(value.as_bytes())?;
        Ok(written + value.len())
    }

    fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError> {
        let wire_type = self.read_wire_type()?;
        if wire_type == WireType::Stop {
            return Ok(FieldHeader::stop());
        }
        let id = self.take::<i16>(2)?;
        Ok(FieldHeader::new(wire_type, id))
    }

    fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_list_begin(&mut self) -> Result<ListHeader, ProtocolError> {
        self.read_list_header()
    }

    fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_set_begin(&mut self) -> Result<ListHeader, ProtocolError> {
        self.read_list_header()
    }

    fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError> {
        let key = self.read_wire_type()?;
        let value = self.read_wire_type()?;
        let size = self.read_size(self.limits.container)?;
        Ok(MapHeader { key, value, size })
    }

    fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        self.take(1)
    }

    fn read_byte(&mut self) -> Result<i8, ProtocolError> {
        self.take(1)
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        self.take(2)
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.take(4)
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.take(8)
    }

    fn read_double(&mut self) -> Result<f64, ProtocolError> {
        self.take(8)
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_size(self.limits.string)?;
        let bytes = self.read_exact(len)?;
        Ok(String::from_utf8(bytes)?)
    }

    fn transport_mut(&mut self) -> &mut dyn Transport {
        &mut self.transport
    }

    fn recursion_limit(&self) -> usize {
        self.limits.recursion
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryProtocolFactory {
    pub limits: BinaryLimits,
}

impl BinaryProtocolFactory {
    pub fn new(limits: BinaryLimits) -> Self {
        Self { limits }
    }
}

impl<T: Transport> ProtocolFactory<T> for BinaryProtocolFactory {
    type Protocol = BinaryProtocol<T>;

    fn protocol(&self, transport: T) -> BinaryProtocol<T> {
        BinaryProtocol::with_limits(transport, self.limits)
    }
}

//! Descriptor-driven struct codec.
//!
//! This module converts records to and from their wire representation by walking
//! the record's [`StructDescriptor`] and calling into a [`Protocol`] one primitive
//! at a time. There is no per-type encode/decode code: adding a record type means
//! adding a descriptor and a [`Record`] conversion, nothing else.
//!
//! # Encoding
//!
//! Fields are written in descriptor order, and only when present. Enum fields go
//! through [`EnumDescriptor::assert`](crate::schema::EnumDescriptor::assert); a tag
//! outside the variant set fails the write with [`CodecError::EnumAssert`].
//!
//! # Decoding
//!
//! Fields may arrive in any order. A field whose id is unknown, or whose wire type
//! differs from the declared one, is skipped rather than rejected, which is what
//! lets producers add optional fields without breaking older consumers. Enum tags
//! are decoded leniently with
//! [`EnumDescriptor::coerce`](crate::schema::EnumDescriptor::coerce). Once the stop
//! marker is reached every required field must have been seen, otherwise the read
//! fails with [`CodecError::MissingRequiredField`].
//!
//! # Example
//! ```rust
//! use fieldwire::codec::{self, Record};
//! use fieldwire::schema::{FieldDescriptor, Requiredness, StructDescriptor, StructValue, TypeSpec, ValueError};
//!
//! #[derive(Debug, PartialEq)]
//! struct Ping {
//!     seq: i64,
//! }
//!
//! static PING: StructDescriptor = StructDescriptor {
//!     name: "Ping",
//!     fields: &[FieldDescriptor::new(1, "seq", TypeSpec::I64, Requiredness::Required)],
//! };
//!
//! impl Record for Ping {
//!     fn descriptor() -> &'static StructDescriptor {
//!         &PING
//!     }
//!
//!     fn to_struct_value(&self) -> StructValue {
//!         StructValue::new().with(1, self.seq)
//!     }
//!
//!     fn from_struct_value(mut value: StructValue) -> Result<Self, ValueError> {
//!         Ok(Self { seq: value.require(1)? })
//!     }
//! }
//!
//! let bytes = codec::serialize(&Ping { seq: 7 }).unwrap();
//! assert_eq!(codec::deserialize::<Ping>(&bytes).unwrap(), Ping { seq: 7 });
//! ```
use log::{debug, trace};
use thiserror::Error;

use crate::{
    protocol::{
        BinaryProtocol, FieldHeader, ListHeader, MapHeader, Protocol, ProtocolError, WireType,
    },
    schema::{
        EnumDescriptor, EnumValue, FieldDescriptor, StructDescriptor, StructValue, TypeSpec, Value,
        ValueError,
    },
    transport::MemoryBuffer,
};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("required field '{field}' was not found in serialized data! struct: {record}")]
    MissingRequiredField {
        record: &'static str,
        field: &'static str,
    },

    #[error("[{record}.{field}] enum {enum_name} has no variant with tag {tag}")]
    EnumAssert {
        record: &'static str,
        field: &'static str,
        enum_name: &'static str,
        tag: i32,
    },

    #[error("[{record}.{field}] {source}")]
    Value {
        record: &'static str,
        field: &'static str,
        source: ValueError,
    },

    #[error("[{record}] list element type {found:?} does not match declared {expected:?}")]
    ElementType {
        record: &'static str,
        expected: WireType,
        found: WireType,
    },

    #[error("[{record}] failed to build record: {source}")]
    Convert {
        record: &'static str,
        source: ValueError,
    },

    #[error("[{record}] nesting deeper than {limit} levels")]
    DepthLimit { record: &'static str, limit: usize },
}

impl CodecError {
    pub fn is_disconnect(&self) -> bool {
        matches!(self, CodecError::Protocol(e) if e.is_disconnect())
    }
}

/// A typed record with a static descriptor.
///
/// Implementations only convert between the typed fields and a [`StructValue`]
/// keyed by field id; the codec handles everything on the wire.
pub trait Record: Sized {
    fn descriptor() -> &'static StructDescriptor;

    fn to_struct_value(&self) -> StructValue;

    fn from_struct_value(value: StructValue) -> Result<Self, ValueError>;
}

/// Encode `record`, returning the number of bytes written.
pub fn write<R: Record, P: Protocol + ?Sized>(
    record: &R,
    out: &mut P,
) -> Result<usize, CodecError> {
    write_struct(R::descriptor(), &record.to_struct_value(), out)
}

pub fn read<R: Record, P: Protocol + ?Sized>(input: &mut P) -> Result<R, CodecError> {
    let descriptor = R::descriptor();
    let value = read_struct(descriptor, input)?;
    R::from_struct_value(value).map_err(|source| CodecError::Convert {
        record: descriptor.name,
        source,
    })
}

/// Encode `record` with the binary protocol into a fresh buffer.
pub fn serialize<R: Record>(record: &R) -> Result<Vec<u8>, CodecError> {
    let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
    write(record, &mut protocol)?;
    Ok(protocol.into_inner().get_buffer().to_vec())
}

pub fn deserialize<R: Record>(bytes: &[u8]) -> Result<R, CodecError> {
    let mut protocol = BinaryProtocol::new(MemoryBuffer::with_bytes(bytes));
    read(&mut protocol)
}

#[derive(Debug, Clone, Copy)]
struct Site {
    record: &'static str,
    field: &'static str,
}

pub fn write_struct<P: Protocol + ?Sized>(
    descriptor: &StructDescriptor,
    value: &StructValue,
    out: &mut P,
) -> Result<usize, CodecError> {
    let mut xfer = out.write_struct_begin(descriptor.name)?;
    for field in descriptor.fields {
        let Some(v) = value.get(field.id) else {
            continue;
        };
        let site = Site {
            record: descriptor.name,
            field: field.name,
        };
        xfer += out.write_field_begin(field.name, field.wire_type(), field.id)?;
        xfer += write_value(&field.ty, v, out, site)?;
        xfer += out.write_field_end()?;
    }
    xfer += out.write_field_stop()?;
    xfer += out.write_struct_end()?;
    Ok(xfer)
}

fn write_value<P: Protocol + ?Sized>(
    ty: &TypeSpec,
    value: &Value,
    out: &mut P,
    site: Site,
) -> Result<usize, CodecError> {
    let written = match (ty, value) {
        (TypeSpec::Bool, Value::Bool(v)) => out.write_bool(*v)?,
        (TypeSpec::Byte, Value::Byte(v)) => out.write_byte(*v)?,
        (TypeSpec::I16, Value::I16(v)) => out.write_i16(*v)?,
        (TypeSpec::I32, Value::I32(v)) => out.write_i32(*v)?,
        (TypeSpec::I64, Value::I64(v)) => out.write_i64(*v)?,
        (TypeSpec::Double, Value::Double(v)) => out.write_double(*v)?,
        (TypeSpec::String, Value::String(v)) => out.write_string(v)?,
        (TypeSpec::Enum(desc), Value::Enum(e)) => write_enum(desc, e.tag(), out, site)?,
        (TypeSpec::Enum(desc), Value::I32(raw)) => write_enum(desc, *raw, out, site)?,
        (TypeSpec::Struct(desc), Value::Struct(v)) => write_struct(desc, v, out)?,
        (TypeSpec::List(element), Value::List(items)) => {
            let header = ListHeader {
                element: element.wire_type(),
                size: items.len(),
            };
            let mut xfer = out.write_list_begin(header)?;
            for item in items {
                xfer += write_value(element, item, out, site)?;
            }
            xfer + out.write_list_end()?
        }
        (TypeSpec::Set(element), Value::Set(items)) => {
            let header = ListHeader {
                element: element.wire_type(),
                size: items.len(),
            };
            let mut xfer = out.write_set_begin(header)?;
            for item in items {
                xfer += write_value(element, item, out, site)?;
            }
            xfer + out.write_set_end()?
        }
        (TypeSpec::Map(key, val), Value::Map(entries)) => {
            let header = MapHeader {
                key: key.wire_type(),
                value: val.wire_type(),
                size: entries.len(),
            };
            let mut xfer = out.write_map_begin(header)?;
            for (k, v) in entries {
                xfer += write_value(key, k, out, site)?;
                xfer += write_value(val, v, out, site)?;
            }
            xfer + out.write_map_end()?
        }
        (ty, value) => {
            return Err(CodecError::Value {
                record: site.record,
                field: site.field,
                source: ValueError::Mismatch {
                    expected: ty.kind(),
                    found: value.kind(),
                },
            });
        }
    };
    Ok(written)
}

fn write_enum<P: Protocol + ?Sized>(
    desc: &EnumDescriptor,
    raw: i32,
    out: &mut P,
    site: Site,
) -> Result<usize, CodecError> {
    let tag = desc.assert(raw).map_err(|e| CodecError::EnumAssert {
        record: site.record,
        field: site.field,
        enum_name: e.name,
        tag: e.tag,
    })?;
    Ok(out.write_i32(tag)?)
}

pub fn read_struct<P: Protocol + ?Sized>(
    descriptor: &StructDescriptor,
    input: &mut P,
) -> Result<StructValue, CodecError> {
    let depth = input.recursion_limit();
    read_struct_at(descriptor, input, depth)
}

fn read_struct_at<P: Protocol + ?Sized>(
    descriptor: &StructDescriptor,
    input: &mut P,
    depth: usize,
) -> Result<StructValue, CodecError> {
    if depth == 0 {
        return Err(CodecError::DepthLimit {
            record: descriptor.name,
            limit: input.recursion_limit(),
        });
    }

    let mut value = StructValue::new();
    let mut isset = vec![false; descriptor.fields.len()];

    input.read_struct_begin()?;
    loop {
        let header = input.read_field_begin()?;
        if header.wire_type == WireType::Stop {
            break;
        }

        match resolve(descriptor, &header) {
            Some((index, field)) => {
                let v = read_value(&field.ty, input, depth, descriptor.name)?;
                value.set(field.id, v);
                isset[index] = true;
            }
            None => {
                trace!(
                    "[{}] skipping field {} {:?} ({:?})",
                    descriptor.name, header.id, header.name, header.wire_type
                );
                input.skip(header.wire_type)?;
            }
        }
        input.read_field_end()?;
    }
    input.read_struct_end()?;

    let missing = descriptor
        .fields
        .iter()
        .zip(&isset)
        .find(|(field, set)| field.is_required() && !**set);
    if let Some((field, _)) = missing {
        return Err(CodecError::MissingRequiredField {
            record: descriptor.name,
            field: field.name,
        });
    }

    Ok(value)
}

/// Find the declared field a header refers to.
///
/// Headers carrying a name instead of an id come from protocols without
/// reliable type information; those take the declared wire type.
fn resolve(
    descriptor: &StructDescriptor,
    header: &FieldHeader,
) -> Option<(usize, &'static FieldDescriptor)> {
    let fields: &'static [FieldDescriptor] = descriptor.fields;

    if header.id == 0 {
        let name = header.name.as_deref()?;
        return fields.iter().enumerate().find(|(_, f)| f.name == name);
    }

    fields
        .iter()
        .enumerate()
        .find(|(_, f)| f.id == header.id && f.wire_type() == header.wire_type)
}

fn read_value<P: Protocol + ?Sized>(
    ty: &TypeSpec,
    input: &mut P,
    depth: usize,
    record: &'static str,
) -> Result<Value, CodecError> {
    let inner = match ty {
        TypeSpec::Struct(_) | TypeSpec::List(_) | TypeSpec::Set(_) | TypeSpec::Map(..) => {
            depth.checked_sub(1).ok_or(CodecError::DepthLimit {
                record,
                limit: input.recursion_limit(),
            })?
        }
        _ => depth,
    };

    let value = match ty {
        TypeSpec::Bool => Value::Bool(input.read_bool()?),
        TypeSpec::Byte => Value::Byte(input.read_byte()?),
        TypeSpec::I16 => Value::I16(input.read_i16()?),
        TypeSpec::I32 => Value::I32(input.read_i32()?),
        TypeSpec::I64 => Value::I64(input.read_i64()?),
        TypeSpec::Double => Value::Double(input.read_double()?),
        TypeSpec::String => Value::String(input.read_string()?),
        TypeSpec::Enum(desc) => {
            let value = desc.coerce(input.read_i32()?);
            if let EnumValue::Unrecognized(raw) = value {
                debug!("[{record}] unrecognized {} tag {raw}", desc.name);
            }
            Value::Enum(value)
        }
        TypeSpec::Struct(desc) => Value::Struct(read_struct_at(desc, input, inner)?),
        TypeSpec::List(element) => {
            let header = input.read_list_begin()?;
            check_element(record, element, header.element, header.size)?;
            let items = read_elements(element, header.size, input, inner, record)?;
            input.read_list_end()?;
            Value::List(items)
        }
        TypeSpec::Set(element) => {
            let header = input.read_set_begin()?;
            check_element(record, element, header.element, header.size)?;
            let items = read_elements(element, header.size, input, inner, record)?;
            input.read_set_end()?;
            Value::Set(items)
        }
        TypeSpec::Map(key, val) => {
            let header = input.read_map_begin()?;
            check_element(record, key, header.key, header.size)?;
            check_element(record, val, header.value, header.size)?;
            let mut entries = Vec::with_capacity(header.size);
            for _ in 0..header.size {
                let k = read_value(key, input, inner, record)?;
                let v = read_value(val, input, inner, record)?;
                entries.push((k, v));
            }
            input.read_map_end()?;
            Value::Map(entries)
        }
    };
    Ok(value)
}

fn read_elements<P: Protocol + ?Sized>(
    element: &TypeSpec,
    size: usize,
    input: &mut P,
    depth: usize,
    record: &'static str,
) -> Result<Vec<Value>, CodecError> {
    let mut items = Vec::with_capacity(size);
    for _ in 0..size {
        items.push(read_value(element, input, depth, record)?);
    }
    Ok(items)
}

// Empty containers carry no values, so their element type is not checked.
fn check_element(
    record: &'static str,
    declared: &TypeSpec,
    found: WireType,
    size: usize,
) -> Result<(), CodecError> {
    if size > 0 && declared.wire_type() != found {
        return Err(CodecError::ElementType {
            record,
            expected: declared.wire_type(),
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::{
        schema::{
            FieldDescriptor, Requiredness, WireEnum,
            tests::{CITY, City},
        },
        transport::MemoryBuffer,
    };

    use super::*;

    static LOCATION: StructDescriptor = StructDescriptor {
        name: "Location",
        fields: &[
            FieldDescriptor::new(1, "name", TypeSpec::String, Requiredness::Required),
            FieldDescriptor::new(2, "lat", TypeSpec::Double, Requiredness::Optional),
        ],
    };

    static TRIP: StructDescriptor = StructDescriptor {
        name: "Trip",
        fields: &[
            FieldDescriptor::new(1, "id", TypeSpec::I64, Requiredness::Required),
            FieldDescriptor::new(2, "destination", TypeSpec::Enum(&CITY), Requiredness::Optional),
            FieldDescriptor::new(
                3,
                "stops",
                TypeSpec::List(&TypeSpec::String),
                Requiredness::Default,
            ),
            FieldDescriptor::new(4, "origin", TypeSpec::Struct(&LOCATION), Requiredness::Optional),
            FieldDescriptor::new(
                5,
                "fares",
                TypeSpec::Map(&TypeSpec::String, &TypeSpec::I32),
                Requiredness::Default,
            ),
        ],
    };

    static LOCATIONS: TypeSpec = TypeSpec::Struct(&LOCATION);

    // A newer revision of Trip with one more field and `destination` sent as a string.
    static TRIP_V2: StructDescriptor = StructDescriptor {
        name: "Trip",
        fields: &[
            FieldDescriptor::new(1, "id", TypeSpec::I64, Requiredness::Required),
            FieldDescriptor::new(2, "destination", TypeSpec::String, Requiredness::Optional),
            FieldDescriptor::new(9, "notes", TypeSpec::List(&LOCATIONS), Requiredness::Optional),
        ],
    };

    // Same ids as Trip but `destination` is a plain integer.
    static TRIP_RAW: StructDescriptor = StructDescriptor {
        name: "Trip",
        fields: &[
            FieldDescriptor::new(1, "id", TypeSpec::I64, Requiredness::Required),
            FieldDescriptor::new(2, "destination", TypeSpec::I32, Requiredness::Optional),
        ],
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Location {
        name: String,
        lat: Option<f64>,
    }

    impl Record for Location {
        fn descriptor() -> &'static StructDescriptor {
            &LOCATION
        }

        fn to_struct_value(&self) -> StructValue {
            let mut value = StructValue::new().with(1, self.name.as_str());
            value.set_opt(2, self.lat);
            value
        }

        fn from_struct_value(mut value: StructValue) -> Result<Self, ValueError> {
            Ok(Self {
                name: value.require(1)?,
                lat: value.take(2)?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Trip {
        id: i64,
        destination: Option<City>,
        stops: Vec<String>,
        origin: Option<Location>,
        fares: BTreeMap<String, i32>,
    }

    impl Record for Trip {
        fn descriptor() -> &'static StructDescriptor {
            &TRIP
        }

        fn to_struct_value(&self) -> StructValue {
            let mut value = StructValue::new()
                .with(1, self.id)
                .with(3, self.stops.clone())
                .with(5, self.fares.clone());
            value.set_opt(2, self.destination.map(City::to_value));
            value.set_opt(4, self.origin.as_ref().map(Location::to_struct_value));
            value
        }

        fn from_struct_value(mut value: StructValue) -> Result<Self, ValueError> {
            Ok(Self {
                id: value.require(1)?,
                destination: value.take::<Value>(2)?.map(City::from_value).transpose()?,
                stops: value.take(3)?.unwrap_or_default(),
                origin: value
                    .take::<StructValue>(4)?
                    .map(Location::from_struct_value)
                    .transpose()?,
                fares: value.take(5)?.unwrap_or_default(),
            })
        }
    }

    fn trip() -> Trip {
        Trip {
            id: 42,
            destination: Some(City::Sea),
            stops: vec!["Portland".into(), "Boise".into()],
            origin: Some(Location {
                name: "Menlo Park".into(),
                lat: Some(37.45),
            }),
            fares: BTreeMap::from([("adult".into(), 120), ("child".into(), 60)]),
        }
    }

    #[test]
    fn round_trip() {
        let trip = trip();
        let bytes = serialize(&trip).unwrap();

        assert_eq!(deserialize::<Trip>(&bytes).unwrap(), trip);
    }

    #[test]
    fn reencoding_is_stable() {
        let bytes = serialize(&trip()).unwrap();
        let decoded: Trip = deserialize(&bytes).unwrap();

        assert_eq!(serialize(&decoded).unwrap(), bytes);
    }

    #[test]
    fn write_reports_bytes_written() {
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());

        let written = write(&trip(), &mut protocol).unwrap();

        assert_eq!(written, protocol.transport().get_buffer().len());
    }

    #[test]
    fn absent_fields_are_not_written() {
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        let value = StructValue::new().with(1, 5i64);

        write_struct(&TRIP, &value, &mut protocol).unwrap();

        // i64 field header + value + stop
        assert_eq!(
            protocol.transport().get_buffer(),
            &[10, 0, 1, 0, 0, 0, 0, 0, 0, 0, 5, 0]
        );
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let plain = StructValue::new().with(1, 7i64);
        let extended = StructValue::new()
            .with(1, 7i64)
            .with(9, vec![Location {
                name: "x".into(),
                lat: None,
            }
            .to_struct_value()]);

        let mut with_extra = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&TRIP_V2, &extended, &mut with_extra).unwrap();
        let mut without = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&TRIP_V2, &plain, &mut without).unwrap();

        let a: Trip = read(&mut with_extra).unwrap();
        let b: Trip = read(&mut without).unwrap();
        assert_eq!(a, b);
        assert_eq!(with_extra.transport().available(), 0);
    }

    #[test]
    fn mismatched_wire_type_is_skipped() {
        let value = StructValue::new().with(1, 1i64).with(2, "SEA");
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&TRIP_V2, &value, &mut protocol).unwrap();

        let trip: Trip = read(&mut protocol).unwrap();

        assert_eq!(trip.id, 1);
        assert_eq!(trip.destination, None);
    }

    #[test]
    fn missing_required_field() {
        let value = StructValue::new().with(3, vec!["a"]);
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&TRIP, &value, &mut protocol).unwrap();

        let err = read::<Trip, _>(&mut protocol).unwrap_err();

        assert!(matches!(
            err,
            CodecError::MissingRequiredField {
                record: "Trip",
                field: "id"
            }
        ));
        assert_eq!(
            err.to_string(),
            "required field 'id' was not found in serialized data! struct: Trip"
        );
    }

    #[test]
    fn missing_required_nested_field() {
        let origin = StructValue::new().with(2, 1.5f64);
        let value = StructValue::new().with(1, 1i64).with(4, origin);
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&TRIP, &value, &mut protocol).unwrap();

        let err = read_struct(&TRIP, &mut protocol).unwrap_err();

        assert!(matches!(
            err,
            CodecError::MissingRequiredField {
                record: "Location",
                field: "name"
            }
        ));
    }

    #[test]
    fn unknown_enum_tag_fails_encode() {
        let mut trip = trip();
        trip.destination = Some(City::Unrecognized(42));

        let err = serialize(&trip).unwrap_err();

        assert!(matches!(
            err,
            CodecError::EnumAssert {
                record: "Trip",
                field: "destination",
                enum_name: "City",
                tag: 42
            }
        ));
    }

    #[test]
    fn unknown_enum_tag_is_coerced_on_decode() {
        let value = StructValue::new().with(1, 1i64).with(2, 42i32);
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&TRIP_RAW, &value, &mut protocol).unwrap();

        let trip: Trip = read(&mut protocol).unwrap();

        assert_eq!(trip.destination, Some(City::Unrecognized(42)));
    }

    #[test]
    fn value_shape_must_match_descriptor() {
        let value = StructValue::new().with(1, "not a number");
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());

        let err = write_struct(&TRIP, &value, &mut protocol).unwrap_err();

        assert!(matches!(
            err,
            CodecError::Value {
                record: "Trip",
                field: "id",
                source: ValueError::Mismatch {
                    expected: "i64",
                    found: "string"
                }
            }
        ));
    }

    #[test]
    fn list_element_type_is_checked() {
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        protocol.write_field_begin("id", WireType::I64, 1).unwrap();
        protocol.write_i64(1).unwrap();
        protocol.write_field_begin("stops", WireType::List, 3).unwrap();
        protocol
            .write_list_begin(ListHeader {
                element: WireType::I32,
                size: 1,
            })
            .unwrap();
        protocol.write_i32(3).unwrap();
        protocol.write_field_stop().unwrap();

        let err = read_struct(&TRIP, &mut protocol).unwrap_err();

        assert!(matches!(
            err,
            CodecError::ElementType {
                expected: WireType::String,
                found: WireType::I32,
                ..
            }
        ));
    }

    #[test]
    fn truncated_message_surfaces_transport_error() {
        let bytes = serialize(&trip()).unwrap();

        let err = deserialize::<Trip>(&bytes[..bytes.len() - 3]).unwrap_err();

        assert!(matches!(err, CodecError::Protocol(ProtocolError::Transport(_))));
        assert!(!err.is_disconnect());
    }

    #[test]
    fn resolve_by_name_uses_declared_type() {
        let header = FieldHeader::named("stops", WireType::String);
        let (index, field) = resolve(&TRIP, &header).unwrap();
        assert_eq!(index, 2);
        assert_eq!(field.id, 3);

        assert!(resolve(&TRIP, &FieldHeader::named("nope", WireType::I32)).is_none());
        assert!(resolve(&TRIP, &FieldHeader::new(WireType::I32, 0)).is_none());
    }

    #[test]
    fn resolve_by_id_checks_wire_type() {
        assert!(resolve(&TRIP, &FieldHeader::new(WireType::I64, 1)).is_some());
        assert!(resolve(&TRIP, &FieldHeader::new(WireType::I32, 1)).is_none());
        assert!(resolve(&TRIP, &FieldHeader::new(WireType::I64, 7)).is_none());
    }

    #[test]
    fn recursive_descriptor_depth_is_bounded() {
        static NODE: StructDescriptor = StructDescriptor {
            name: "Node",
            fields: &[FieldDescriptor::new(
                1,
                "next",
                TypeSpec::Struct(&NODE),
                Requiredness::Optional,
            )],
        };

        let mut value = StructValue::new();
        for _ in 0..80 {
            value = StructValue::new().with(1, value);
        }
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&NODE, &value, &mut protocol).unwrap();

        let err = read_struct(&NODE, &mut protocol).unwrap_err();

        assert!(matches!(err, CodecError::DepthLimit { record: "Node", .. }));
    }

    #[test]
    fn nested_containers_count_toward_depth() {
        static ROW: TypeSpec = TypeSpec::List(&TypeSpec::I32);
        static CELL: StructDescriptor = StructDescriptor {
            name: "Cell",
            fields: &[
                FieldDescriptor::new(1, "next", TypeSpec::Struct(&CELL), Requiredness::Optional),
                FieldDescriptor::new(2, "grid", TypeSpec::List(&ROW), Requiredness::Optional),
            ],
        };

        fn nested(levels: usize) -> StructValue {
            let mut value = StructValue::new().with(2, vec![vec![1i32]]);
            for _ in 0..levels {
                value = StructValue::new().with(1, value);
            }
            value
        }

        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&CELL, &nested(10), &mut protocol).unwrap();
        assert!(read_struct(&CELL, &mut protocol).is_ok());

        // The innermost grid sits one level below the limit; its rows do not fit.
        let mut protocol = BinaryProtocol::new(MemoryBuffer::new());
        write_struct(&CELL, &nested(63), &mut protocol).unwrap();

        let err = read_struct(&CELL, &mut protocol).unwrap_err();

        assert!(matches!(err, CodecError::DepthLimit { record: "Cell", limit: 64 }));
    }
}

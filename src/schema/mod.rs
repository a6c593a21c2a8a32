//! Static record metadata.
//!
//! Every record type describes itself once with a [`StructDescriptor`]: an ordered
//! table of [`FieldDescriptor`]s giving each field's id, name, type and
//! requiredness. Descriptors are plain `static` data, so they are built at compile
//! time and never change. The [`codec`](crate::codec) interprets them to encode
//! and decode any record without per-type dispatch code.
//!
//! # Example
//! ```rust
//! use fieldwire::schema::{EnumDescriptor, FieldDescriptor, Requiredness, StructDescriptor, TypeSpec};
//!
//! static COMPANY: EnumDescriptor = EnumDescriptor {
//!     name: "Company",
//!     variants: &[("FACEBOOK", 0), ("WHATSAPP", 1)],
//! };
//!
//! static INTERNSHIP: StructDescriptor = StructDescriptor {
//!     name: "Internship",
//!     fields: &[
//!         FieldDescriptor::new(1, "weeks", TypeSpec::I32, Requiredness::Required),
//!         FieldDescriptor::new(2, "title", TypeSpec::String, Requiredness::Default),
//!         FieldDescriptor::new(3, "employer", TypeSpec::Enum(&COMPANY), Requiredness::Optional),
//!     ],
//! };
//!
//! assert!(INTERNSHIP.validate().is_ok());
//! assert_eq!(INTERNSHIP.field_id("employer"), Some(3));
//! assert!(COMPANY.assert(5).is_err());
//! ```
use thiserror::Error;

use crate::protocol::WireType;

mod value;

pub use value::{FromValue, IntoValue, StructValue, Value, ValueError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("[{record}] duplicate field id {id}")]
    DuplicateId { record: &'static str, id: i16 },

    #[error("[{record}] duplicate field name '{name}'")]
    DuplicateName {
        record: &'static str,
        name: &'static str,
    },

    #[error("[{record}] field '{name}' uses reserved id 0")]
    ReservedId {
        record: &'static str,
        name: &'static str,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown tag {tag} for enum {name}")]
pub struct UnknownEnumTag {
    pub name: &'static str,
    pub tag: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requiredness {
    /// Must be present on the wire; decoding fails otherwise.
    Required,
    Optional,
    /// Written whenever set; tolerated when absent.
    Default,
}

/// Full type of a field, including any nested enum, struct or element types.
#[derive(Debug, Clone, Copy)]
pub enum TypeSpec {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    Enum(&'static EnumDescriptor),
    Struct(&'static StructDescriptor),
    List(&'static TypeSpec),
    Set(&'static TypeSpec),
    Map(&'static TypeSpec, &'static TypeSpec),
}

impl TypeSpec {
    pub const fn wire_type(&self) -> WireType {
        match self {
            TypeSpec::Bool => WireType::Bool,
            TypeSpec::Byte => WireType::Byte,
            TypeSpec::I16 => WireType::I16,
            TypeSpec::I32 | TypeSpec::Enum(_) => WireType::I32,
            TypeSpec::I64 => WireType::I64,
            TypeSpec::Double => WireType::Double,
            TypeSpec::String => WireType::String,
            TypeSpec::Struct(_) => WireType::Struct,
            TypeSpec::List(_) => WireType::List,
            TypeSpec::Set(_) => WireType::Set,
            TypeSpec::Map(_, _) => WireType::Map,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TypeSpec::Bool => "bool",
            TypeSpec::Byte => "byte",
            TypeSpec::I16 => "i16",
            TypeSpec::I32 => "i32",
            TypeSpec::I64 => "i64",
            TypeSpec::Double => "double",
            TypeSpec::String => "string",
            TypeSpec::Enum(_) => "enum",
            TypeSpec::Struct(_) => "struct",
            TypeSpec::List(_) => "list",
            TypeSpec::Set(_) => "set",
            TypeSpec::Map(_, _) => "map",
        }
    }

    /// Name of the referenced enum or struct, if any.
    pub fn nested(&self) -> Option<&'static str> {
        match self {
            TypeSpec::Enum(desc) => Some(desc.name),
            TypeSpec::Struct(desc) => Some(desc.name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub id: i16,
    pub name: &'static str,
    pub ty: TypeSpec,
    pub requiredness: Requiredness,
}

impl FieldDescriptor {
    pub const fn new(
        id: i16,
        name: &'static str,
        ty: TypeSpec,
        requiredness: Requiredness,
    ) -> Self {
        Self {
            id,
            name,
            ty,
            requiredness,
        }
    }

    pub const fn wire_type(&self) -> WireType {
        self.ty.wire_type()
    }

    pub fn is_required(&self) -> bool {
        self.requiredness == Requiredness::Required
    }
}

#[derive(Debug)]
pub struct StructDescriptor {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl StructDescriptor {
    pub fn field(&self, id: i16) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_id(&self, name: &str) -> Option<i16> {
        self.field_by_name(name).map(|f| f.id)
    }

    pub fn required(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_required())
    }

    /// Check that ids and names are unique and no field uses id 0, which
    /// name-keyed protocols report for "unknown id".
    pub fn validate(&self) -> Result<(), DescriptorError> {
        for (i, field) in self.fields.iter().enumerate() {
            if field.id == 0 {
                return Err(DescriptorError::ReservedId {
                    record: self.name,
                    name: field.name,
                });
            }
            for other in &self.fields[i + 1..] {
                if other.id == field.id {
                    return Err(DescriptorError::DuplicateId {
                        record: self.name,
                        id: field.id,
                    });
                }
                if other.name == field.name {
                    return Err(DescriptorError::DuplicateName {
                        record: self.name,
                        name: field.name,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct EnumDescriptor {
    pub name: &'static str,
    pub variants: &'static [(&'static str, i32)],
}

impl EnumDescriptor {
    pub fn variant_name(&self, tag: i32) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(_, value)| *value == tag)
            .map(|(name, _)| *name)
    }

    /// Lenient conversion used when decoding; never fails.
    pub fn coerce(&self, raw: i32) -> EnumValue {
        match self.variant_name(raw) {
            Some(name) => EnumValue::Known { name, tag: raw },
            None => EnumValue::Unrecognized(raw),
        }
    }

    /// Strict conversion used when encoding.
    pub fn assert(&self, tag: i32) -> Result<i32, UnknownEnumTag> {
        match self.variant_name(tag) {
            Some(_) => Ok(tag),
            None => Err(UnknownEnumTag {
                name: self.name,
                tag,
            }),
        }
    }
}

/// Decoded enum value. Tags outside the variant set are kept as
/// [`EnumValue::Unrecognized`] rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumValue {
    Known { name: &'static str, tag: i32 },
    Unrecognized(i32),
}

impl EnumValue {
    pub fn tag(&self) -> i32 {
        match self {
            EnumValue::Known { tag, .. } => *tag,
            EnumValue::Unrecognized(raw) => *raw,
        }
    }
}

/// Typed enum with a sentinel variant for unrecognized tags.
pub trait WireEnum: Sized + Copy {
    fn descriptor() -> &'static EnumDescriptor;

    fn from_tag(tag: i32) -> Option<Self>;

    fn unrecognized(raw: i32) -> Self;

    fn tag(self) -> i32;

    fn coerce(raw: i32) -> Self {
        Self::from_tag(raw).unwrap_or_else(|| Self::unrecognized(raw))
    }

    fn assert(self) -> Result<i32, UnknownEnumTag> {
        Self::descriptor().assert(self.tag())
    }

    fn to_value(self) -> Value {
        Value::Enum(Self::descriptor().coerce(self.tag()))
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Enum(e) => Ok(Self::coerce(e.tag())),
            Value::I32(raw) => Ok(Self::coerce(raw)),
            other => Err(ValueError::Mismatch {
                expected: "enum",
                found: other.kind(),
            }),
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use super::EnumValue;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("expected {expected} value, found {found}")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("field {0} is not set")]
    Missing(i16),
}

/// Dynamically typed field value, shaped after the field's [`TypeSpec`](super::TypeSpec).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    String(String),
    Enum(EnumValue),
    Struct(StructValue),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Struct(_) => "struct",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }
}

/// Field values of one record keyed by field id. Absent ids are unset fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructValue {
    fields: BTreeMap<i16, Value>,
}

impl StructValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: i16, value: impl IntoValue) -> Self {
        self.set(id, value);
        self
    }

    pub fn set(&mut self, id: i16, value: impl IntoValue) {
        self.fields.insert(id, value.into_value());
    }

    /// Set the field when `value` is present; leave it unset otherwise.
    pub fn set_opt<T: IntoValue>(&mut self, id: i16, value: Option<T>) {
        if let Some(value) = value {
            self.set(id, value);
        }
    }

    pub fn get(&self, id: i16) -> Option<&Value> {
        self.fields.get(&id)
    }

    pub fn contains(&self, id: i16) -> bool {
        self.fields.contains_key(&id)
    }

    pub fn remove(&mut self, id: i16) -> Option<Value> {
        self.fields.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn take<T: FromValue>(&mut self, id: i16) -> Result<Option<T>, ValueError> {
        self.remove(id).map(T::from_value).transpose()
    }

    pub fn require<T: FromValue>(&mut self, id: i16) -> Result<T, ValueError> {
        self.take(id)?.ok_or(ValueError::Missing(id))
    }
}

pub trait IntoValue {
    fn into_value(self) -> Value;
}

pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, ValueError>;
}

macro_rules! primitive_value {
    ($($ty:ty => $variant:ident, $kind:literal;)*) => {
        $(
            impl IntoValue for $ty {
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, ValueError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(ValueError::Mismatch {
                            expected: $kind,
                            found: other.kind(),
                        }),
                    }
                }
            }
        )*
    };
}

primitive_value! {
    bool => Bool, "bool";
    i8 => Byte, "byte";
    i16 => I16, "i16";
    i32 => I32, "i32";
    i64 => I64, "i64";
    f64 => Double, "double";
    String => String, "string";
    StructValue => Struct, "struct";
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueError::Mismatch {
                expected: "list",
                found: other.kind(),
            }),
        }
    }
}

impl<T: IntoValue> IntoValue for BTreeSet<T> {
    fn into_value(self) -> Value {
        Value::Set(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: FromValue + Ord> FromValue for BTreeSet<T> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Set(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueError::Mismatch {
                expected: "set",
                found: other.kind(),
            }),
        }
    }
}

impl<K: IntoValue, V: IntoValue> IntoValue for BTreeMap<K, V> {
    fn into_value(self) -> Value {
        Value::Map(
            self.into_iter()
                .map(|(k, v)| (k.into_value(), v.into_value()))
                .collect(),
        )
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(ValueError::Mismatch {
                expected: "map",
                found: other.kind(),
            }),
        }
    }
}

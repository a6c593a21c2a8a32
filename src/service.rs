//! In-memory key-value service used by the bundled server and CLI.
use std::collections::BTreeMap;

use log::{debug, info};

use crate::{
    codec::{self, CodecError, Record},
    protocol::{Protocol, ProtocolError},
    schema::{
        EnumDescriptor, FieldDescriptor, Requiredness, StructDescriptor, StructValue, TypeSpec,
        Value, ValueError, WireEnum,
    },
    server::Processor,
};

pub static OPERATION: EnumDescriptor = EnumDescriptor {
    name: "Operation",
    variants: &[("PING", 0), ("GET", 1), ("PUT", 2), ("DELETE", 3), ("KEYS", 4)],
};

pub static STATUS: EnumDescriptor = EnumDescriptor {
    name: "Status",
    variants: &[("OK", 0), ("NOT_FOUND", 1), ("ERROR", 2)],
};

pub static KV_REQUEST: StructDescriptor = StructDescriptor {
    name: "KvRequest",
    fields: &[
        FieldDescriptor::new(1, "op", TypeSpec::Enum(&OPERATION), Requiredness::Required),
        FieldDescriptor::new(2, "key", TypeSpec::String, Requiredness::Optional),
        FieldDescriptor::new(3, "value", TypeSpec::String, Requiredness::Optional),
    ],
};

pub static KV_RESPONSE: StructDescriptor = StructDescriptor {
    name: "KvResponse",
    fields: &[
        FieldDescriptor::new(1, "status", TypeSpec::Enum(&STATUS), Requiredness::Required),
        FieldDescriptor::new(2, "value", TypeSpec::String, Requiredness::Optional),
        FieldDescriptor::new(
            3,
            "keys",
            TypeSpec::List(&TypeSpec::String),
            Requiredness::Default,
        ),
        FieldDescriptor::new(4, "message", TypeSpec::String, Requiredness::Optional),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Ping,
    Get,
    Put,
    Delete,
    Keys,
    Unrecognized(i32),
}

impl WireEnum for Operation {
    fn descriptor() -> &'static EnumDescriptor {
        &OPERATION
    }

    fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Operation::Ping),
            1 => Some(Operation::Get),
            2 => Some(Operation::Put),
            3 => Some(Operation::Delete),
            4 => Some(Operation::Keys),
            _ => None,
        }
    }

    fn unrecognized(raw: i32) -> Self {
        Operation::Unrecognized(raw)
    }

    fn tag(self) -> i32 {
        match self {
            Operation::Ping => 0,
            Operation::Get => 1,
            Operation::Put => 2,
            Operation::Delete => 3,
            Operation::Keys => 4,
            Operation::Unrecognized(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    Error,
    Unrecognized(i32),
}

impl WireEnum for Status {
    fn descriptor() -> &'static EnumDescriptor {
        &STATUS
    }

    fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Status::Ok),
            1 => Some(Status::NotFound),
            2 => Some(Status::Error),
            _ => None,
        }
    }

    fn unrecognized(raw: i32) -> Self {
        Status::Unrecognized(raw)
    }

    fn tag(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::NotFound => 1,
            Status::Error => 2,
            Status::Unrecognized(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvRequest {
    pub op: Operation,
    pub key: Option<String>,
    pub value: Option<String>,
}

impl KvRequest {
    pub fn new(op: Operation) -> Self {
        Self {
            op,
            key: None,
            value: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl Record for KvRequest {
    fn descriptor() -> &'static StructDescriptor {
        &KV_REQUEST
    }

    fn to_struct_value(&self) -> StructValue {
        let mut value = StructValue::new().with(1, self.op.to_value());
        value.set_opt(2, self.key.clone());
        value.set_opt(3, self.value.clone());
        value
    }

    fn from_struct_value(mut value: StructValue) -> Result<Self, ValueError> {
        Ok(Self {
            op: Operation::from_value(value.require::<Value>(1)?)?,
            key: value.take(2)?,
            value: value.take(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvResponse {
    pub status: Status,
    pub value: Option<String>,
    pub keys: Vec<String>,
    pub message: Option<String>,
}

impl KvResponse {
    fn status(status: Status) -> Self {
        Self {
            status,
            value: None,
            keys: Vec::new(),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::status(Status::Error)
        }
    }
}

impl Record for KvResponse {
    fn descriptor() -> &'static StructDescriptor {
        &KV_RESPONSE
    }

    fn to_struct_value(&self) -> StructValue {
        let mut value = StructValue::new()
            .with(1, self.status.to_value())
            .with(3, self.keys.clone());
        value.set_opt(2, self.value.clone());
        value.set_opt(4, self.message.clone());
        value
    }

    fn from_struct_value(mut value: StructValue) -> Result<Self, ValueError> {
        Ok(Self {
            status: Status::from_value(value.require::<Value>(1)?)?,
            value: value.take(2)?,
            keys: value.take(3)?.unwrap_or_default(),
            message: value.take(4)?,
        })
    }
}

/// Key-value store answering one [`KvRequest`] per call.
#[derive(Debug, Default)]
pub struct KvService {
    store: BTreeMap<String, String>,
    handled: u64,
}

impl KvService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub fn handle(&mut self, request: KvRequest) -> KvResponse {
        self.handled += 1;

        match (request.op, request.key) {
            (Operation::Ping, _) => KvResponse {
                message: Some("pong".into()),
                ..KvResponse::status(Status::Ok)
            },
            (Operation::Keys, _) => KvResponse {
                keys: self.store.keys().cloned().collect(),
                ..KvResponse::status(Status::Ok)
            },
            (Operation::Get, Some(key)) => match self.store.get(&key) {
                Some(value) => KvResponse {
                    value: Some(value.clone()),
                    ..KvResponse::status(Status::Ok)
                },
                None => KvResponse::status(Status::NotFound),
            },
            (Operation::Put, Some(key)) => match request.value {
                Some(value) => {
                    info!("put {key}");
                    self.store.insert(key, value);
                    KvResponse::status(Status::Ok)
                }
                None => KvResponse::error("put requires a value"),
            },
            (Operation::Delete, Some(key)) => match self.store.remove(&key) {
                Some(_) => {
                    info!("deleted {key}");
                    KvResponse::status(Status::Ok)
                }
                None => KvResponse::status(Status::NotFound),
            },
            (Operation::Get | Operation::Put | Operation::Delete, None) => {
                KvResponse::error("missing key")
            }
            (Operation::Unrecognized(raw), _) => {
                debug!("unknown operation {raw}");
                KvResponse::error(format!("unknown operation {raw}"))
            }
        }
    }
}

impl<P: Protocol + ?Sized> Processor<P> for KvService {
    fn process(&mut self, protocol: &mut P) -> Result<(), CodecError> {
        let request: KvRequest = codec::read(protocol)?;
        debug!("received request: {request:?}");
        let response = self.handle(request);
        codec::write(&response, protocol)?;
        Ok(())
    }
}

/// Send `request` and wait for the response.
pub fn call<P: Protocol + ?Sized>(
    protocol: &mut P,
    request: &KvRequest,
) -> Result<KvResponse, CodecError> {
    codec::write(request, protocol)?;
    protocol.transport_mut().flush().map_err(ProtocolError::from)?;
    codec::read(protocol)
}

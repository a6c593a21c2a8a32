pub mod codec;
pub mod protocol;
pub mod schema;
pub mod server;
pub mod service;
pub mod transport;

pub use codec::{CodecError, Record};
pub use protocol::{BinaryProtocol, Protocol, WireType};
pub use schema::{EnumDescriptor, FieldDescriptor, StructDescriptor, WireEnum};
pub use server::{NonBlockingServer, Processor, ServerConfig};
pub use transport::{MemoryBuffer, Transport};

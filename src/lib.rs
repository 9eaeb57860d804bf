//! AMR Interface Registry
//!
//! Schema registry and binary codec for the message, service and action
//! interfaces spoken between mobile-robot software components (base control,
//! SLAM, navigation).
//!
//! ## Features
//!
//! - **Typed Schemas**: Messages, service request/response pairs and action
//!   goal/feedback/result triples with primitive, enum, array and nested fields
//! - **Consistent Registry**: Batches register atomically; duplicate names,
//!   unresolved references and reference cycles are rejected
//! - **Binary Codec**: Little-endian, length-prefixed encoding with explicit
//!   errors for every malformed input
//! - **Type Hashes**: SHA-256 over the canonical schema, nested types included
//! - **Contracts**: Service calls and actions resolve through cancellable
//!   `Pending` handles that complete exactly once
//! - **Code Generation**: Rust bindings for every registered interface
//!
//! ## Architecture
//!
//! ```text
//! interfaces/*.json ──► manifest ──► registry ──► codec ──► contract
//!                                       │
//!                                       ├──► checksum (type hashes)
//!                                       └──► codegen (Rust bindings)
//! ```

pub mod bundled;
pub mod checksum;
pub mod codec;
pub mod codegen;
pub mod config;
pub mod contract;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod schema;
pub mod value;

pub use checksum::TypeHash;
pub use codec::{Codec, CodecLimits};
pub use config::InterfacesConfig;
pub use contract::{
    ActionContract, CallTransport, Completer, ContractBinder, GoalHandle, Pending, ServiceContract,
};
pub use error::{CallError, CodecError, InterfaceError, RegistryError, Result, ValidationError};
pub use manifest::{InterfaceManifest, InterfaceSet};
pub use registry::{SchemaEntry, SchemaRegistry};
pub use schema::{EnumDef, FieldDef, FieldType, IntKind, Schema, SchemaKind, SchemaResolver};
pub use value::Value;

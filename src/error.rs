//! Error types for the interface registry, codec and call contracts

use thiserror::Error;

/// Result type for crate-level operations
pub type Result<T> = std::result::Result<T, InterfaceError>;

/// A value does not have the shape its schema declares.
///
/// Recoverable: the caller fixes the value and retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field '{path}'")]
    FieldMissing { path: String },

    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("value {value} at '{path}' is not a member of enum {enum_name}")]
    EnumOutOfRange {
        path: String,
        enum_name: String,
        value: i64,
    },

    #[error("array at '{path}' has {actual} elements, expected exactly {expected}")]
    ArrayLengthMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("field '{path}' is not declared by schema {schema}")]
    UnknownField { path: String, schema: String },

    #[error("schema {name} referenced at '{path}' is not registered")]
    UnresolvedSchema { path: String, name: String },
}

impl ValidationError {
    /// Field path of the offending value (empty for the message root)
    pub fn path(&self) -> &str {
        match self {
            Self::FieldMissing { path }
            | Self::TypeMismatch { path, .. }
            | Self::EnumOutOfRange { path, .. }
            | Self::ArrayLengthMismatch { path, .. }
            | Self::UnknownField { path, .. }
            | Self::UnresolvedSchema { path, .. } => path,
        }
    }
}

/// Schema graph problems. Fatal during initialisation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("interface already registered: {name}")]
    DuplicateName { name: String },

    #[error("{from} references unregistered interface {target}{}", suggestion_suffix(.suggestion))]
    UnresolvedReference {
        from: String,
        target: String,
        suggestion: Option<String>,
    },

    #[error("cyclic reference between interfaces: {}", .members.join(" -> "))]
    CyclicReference { members: Vec<String> },

    #[error("invalid interface {name}: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("interface {name} is a {actual}, expected {expected}")]
    KindMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(" (did you mean {}?)", s),
        None => String::new(),
    }
}

/// Malformed or truncated bytes. Recoverable per message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input at '{path}': need {needed} bytes, {available} left")]
    UnexpectedEof {
        path: String,
        needed: usize,
        available: usize,
    },

    #[error("invalid value {value} for enum {enum_name} at '{path}'")]
    InvalidEnum {
        path: String,
        enum_name: String,
        value: i64,
    },

    #[error("length prefix {length} at '{path}' exceeds limit of {limit}")]
    LengthOverflow {
        path: String,
        length: usize,
        limit: usize,
    },

    #[error("invalid bool byte {byte:#04x} at '{path}'")]
    InvalidBool { path: String, byte: u8 },

    #[error("invalid UTF-8 in string at '{path}'")]
    InvalidUtf8 { path: String },

    #[error("{count} trailing bytes after decoding {schema}")]
    TrailingBytes { schema: String, count: usize },

    #[error("schema {name} referenced at '{path}' is not registered")]
    UnresolvedSchema { path: String, name: String },

    #[error("refusing to encode invalid value: {0}")]
    Validation(#[from] ValidationError),
}

/// Terminal failure outcomes of an outstanding call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("call was cancelled")]
    Cancelled,

    #[error("transport dropped the call without completing it")]
    Abandoned,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(#[from] CodecError),
}

/// Crate-level error
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("interface not found: {0}")]
    NotFound(String),

    #[error("invalid manifest {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

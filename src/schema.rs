//! Schema types and structures
//!
//! A [`Schema`] is the declared shape of one message, request, response, goal,
//! feedback or result: an ordered list of typed fields. Field types form a
//! closed set ([`FieldType`]); references to other interfaces are by qualified
//! name and resolved through a [`SchemaResolver`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::value::{join_field, join_index, Value};

/// Role of a schema within a message, service or action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// Plain message (topic payload)
    Message,
    /// Request half of a service
    ServiceRequest,
    /// Response half of a service
    ServiceResponse,
    /// Goal of an action
    ActionGoal,
    /// Feedback stream of an action
    ActionFeedback,
    /// Result of an action
    ActionResult,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Message => "message",
            SchemaKind::ServiceRequest => "service_request",
            SchemaKind::ServiceResponse => "service_response",
            SchemaKind::ActionGoal => "action_goal",
            SchemaKind::ActionFeedback => "action_feedback",
            SchemaKind::ActionResult => "action_result",
        }
    }

    /// Name suffix used when a service or action block is expanded into schemas
    pub fn suffix(&self) -> &'static str {
        match self {
            SchemaKind::Message => "",
            SchemaKind::ServiceRequest => "_Request",
            SchemaKind::ServiceResponse => "_Response",
            SchemaKind::ActionGoal => "_Goal",
            SchemaKind::ActionFeedback => "_Feedback",
            SchemaKind::ActionResult => "_Result",
        }
    }

    /// Interface namespace segment (`msg`, `srv`, `action`)
    pub fn namespace(&self) -> &'static str {
        match self {
            SchemaKind::Message => "msg",
            SchemaKind::ServiceRequest | SchemaKind::ServiceResponse => "srv",
            SchemaKind::ActionGoal | SchemaKind::ActionFeedback | SchemaKind::ActionResult => {
                "action"
            }
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer representation of an enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntKind {
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
}

impl IntKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntKind::Int8 => "int8",
            IntKind::Int16 => "int16",
            IntKind::Int32 => "int32",
            IntKind::Int64 => "int64",
            IntKind::UInt8 => "uint8",
            IntKind::UInt16 => "uint16",
            IntKind::UInt32 => "uint32",
            IntKind::UInt64 => "uint64",
        }
    }

    /// Encoded width in bytes
    pub fn width(&self) -> usize {
        match self {
            IntKind::Int8 | IntKind::UInt8 => 1,
            IntKind::Int16 | IntKind::UInt16 => 2,
            IntKind::Int32 | IntKind::UInt32 => 4,
            IntKind::Int64 | IntKind::UInt64 => 8,
        }
    }

    /// Whether `value` is representable in this width
    pub fn contains(&self, value: i64) -> bool {
        match self {
            IntKind::Int8 => i8::try_from(value).is_ok(),
            IntKind::Int16 => i16::try_from(value).is_ok(),
            IntKind::Int32 => i32::try_from(value).is_ok(),
            IntKind::Int64 => true,
            IntKind::UInt8 => u8::try_from(value).is_ok(),
            IntKind::UInt16 => u16::try_from(value).is_ok(),
            IntKind::UInt32 => u32::try_from(value).is_ok(),
            IntKind::UInt64 => value >= 0,
        }
    }
}

impl fmt::Display for IntKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named member of an enum
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumVariant {
    pub name: String,
    pub value: i64,
}

/// Enum declaration: a named value set over an integer representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: String,
    pub repr: IntKind,
    pub values: Vec<EnumVariant>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>, repr: IntKind, values: &[(&str, i64)]) -> Self {
        Self {
            name: name.into(),
            repr,
            values: values
                .iter()
                .map(|(name, value)| EnumVariant {
                    name: name.to_string(),
                    value: *value,
                })
                .collect(),
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.values.iter().any(|v| v.value == value)
    }

    /// Integer value of a named member
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.values.iter().find(|v| v.name == name).map(|v| v.value)
    }

    /// Name of the member holding `value`
    pub fn name_of(&self, value: i64) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.value == value)
            .map(|v| v.name.as_str())
    }
}

/// Semantic type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FieldType {
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint8")]
    UInt8,
    #[serde(rename = "uint16")]
    UInt16,
    #[serde(rename = "uint32")]
    UInt32,
    #[serde(rename = "uint64")]
    UInt64,
    #[serde(rename = "float32")]
    Float32,
    #[serde(rename = "float64")]
    Float64,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "enum")]
    Enum(EnumDef),
    #[serde(rename = "array")]
    FixedArray { elem: Box<FieldType>, len: usize },
    #[serde(rename = "sequence")]
    Sequence { elem: Box<FieldType> },
    #[serde(rename = "nested")]
    Nested { schema: String },
}

impl FieldType {
    pub fn fixed_array(elem: FieldType, len: usize) -> Self {
        FieldType::FixedArray {
            elem: Box::new(elem),
            len,
        }
    }

    pub fn sequence(elem: FieldType) -> Self {
        FieldType::Sequence {
            elem: Box::new(elem),
        }
    }

    pub fn nested(schema: impl Into<String>) -> Self {
        FieldType::Nested {
            schema: schema.into(),
        }
    }

    /// Integer representation for the eight integer primitives
    pub fn int_kind(&self) -> Option<IntKind> {
        match self {
            FieldType::Int8 => Some(IntKind::Int8),
            FieldType::Int16 => Some(IntKind::Int16),
            FieldType::Int32 => Some(IntKind::Int32),
            FieldType::Int64 => Some(IntKind::Int64),
            FieldType::UInt8 => Some(IntKind::UInt8),
            FieldType::UInt16 => Some(IntKind::UInt16),
            FieldType::UInt32 => Some(IntKind::UInt32),
            FieldType::UInt64 => Some(IntKind::UInt64),
            _ => None,
        }
    }

    /// Qualified name of the interface this type refers to, looking through arrays
    pub fn nested_target(&self) -> Option<&str> {
        match self {
            FieldType::Nested { schema } => Some(schema),
            FieldType::FixedArray { elem, .. } | FieldType::Sequence { elem } => {
                elem.nested_target()
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => f.write_str("bool"),
            FieldType::Float32 => f.write_str("float32"),
            FieldType::Float64 => f.write_str("float64"),
            FieldType::String => f.write_str("string"),
            FieldType::Enum(def) => write!(f, "{}({})", def.name, def.repr),
            FieldType::FixedArray { elem, len } => write!(f, "{}[{}]", elem, len),
            FieldType::Sequence { elem } => write!(f, "{}[]", elem),
            FieldType::Nested { schema } => f.write_str(schema),
            other => match other.int_kind() {
                Some(kind) => f.write_str(kind.as_str()),
                None => Ok(()),
            },
        }
    }
}

/// A single field of a schema
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Value used when the field is absent; makes the field optional
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Lookup of registered schemas by qualified name
pub trait SchemaResolver {
    fn resolve(&self, name: &str) -> Option<&Schema>;
}

impl SchemaResolver for std::collections::HashMap<String, Schema> {
    fn resolve(&self, name: &str) -> Option<&Schema> {
        self.get(name)
    }
}

/// A single interface definition
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Qualified name, e.g. "amr_interfaces/msg/BatteryInfo"
    pub name: String,
    pub kind: SchemaKind,
    /// Fields in declaration (and wire) order
    pub fields: Vec<FieldDef>,
}

impl Schema {
    pub fn new(name: impl Into<String>, kind: SchemaKind, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            kind,
            fields,
        }
    }

    /// Create a plain message schema
    pub fn message(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self::new(name, SchemaKind::Message, fields)
    }

    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Package segment of the qualified name
    pub fn package(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }

    /// Last segment of the qualified name
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Qualified names of every interface referenced by this schema's fields
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self
            .fields
            .iter()
            .filter_map(|f| f.field_type.nested_target())
            .collect();
        refs.sort_unstable();
        refs.dedup();
        refs
    }

    /// Check that `value` conforms to this schema
    pub fn validate(&self, value: &Value, resolver: &dyn SchemaResolver) -> Result<(), ValidationError> {
        validate_message(self, value, resolver, "")
    }

    /// Fill in declared defaults for absent fields, recursively
    ///
    /// Values that do not conform are returned unchanged where they differ.
    pub fn with_defaults(&self, value: Value, resolver: &dyn SchemaResolver) -> Value {
        let mut fields = match value {
            Value::Message(fields) => fields,
            other => return other,
        };
        for def in &self.fields {
            match fields.remove(&def.name) {
                Some(v) => {
                    fields.insert(def.name.clone(), fill_defaults(&def.field_type, v, resolver));
                }
                None => {
                    if let Some(default) = &def.default {
                        fields.insert(def.name.clone(), default.clone());
                    }
                }
            }
        }
        Value::Message(fields)
    }
}

fn fill_defaults(field_type: &FieldType, value: Value, resolver: &dyn SchemaResolver) -> Value {
    match (field_type, value) {
        (FieldType::Nested { schema }, value) => match resolver.resolve(schema) {
            Some(nested) => nested.with_defaults(value, resolver),
            None => value,
        },
        (FieldType::FixedArray { elem, .. } | FieldType::Sequence { elem }, Value::Array(items)) => {
            Value::Array(
                items
                    .into_iter()
                    .map(|item| fill_defaults(elem, item, resolver))
                    .collect(),
            )
        }
        (_, value) => value,
    }
}

fn validate_message(
    schema: &Schema,
    value: &Value,
    resolver: &dyn SchemaResolver,
    path: &str,
) -> Result<(), ValidationError> {
    let fields = match value {
        Value::Message(fields) => fields,
        other => {
            return Err(ValidationError::TypeMismatch {
                path: path.to_string(),
                expected: schema.name.clone(),
                found: other.type_name().to_string(),
            })
        }
    };

    for def in &schema.fields {
        let field_path = join_field(path, &def.name);
        match fields.get(&def.name) {
            Some(v) => validate_field(&def.field_type, v, resolver, &field_path)?,
            None if def.default.is_some() => {}
            None => return Err(ValidationError::FieldMissing { path: field_path }),
        }
    }

    if let Some(unknown) = fields.keys().find(|name| schema.field(name).is_none()) {
        return Err(ValidationError::UnknownField {
            path: join_field(path, unknown),
            schema: schema.name.clone(),
        });
    }

    Ok(())
}

/// Check a single value against a field type
pub(crate) fn validate_field(
    field_type: &FieldType,
    value: &Value,
    resolver: &dyn SchemaResolver,
    path: &str,
) -> Result<(), ValidationError> {
    match (field_type, value) {
        (FieldType::Bool, Value::Bool(_))
        | (FieldType::Int8, Value::Int8(_))
        | (FieldType::Int16, Value::Int16(_))
        | (FieldType::Int32, Value::Int32(_))
        | (FieldType::Int64, Value::Int64(_))
        | (FieldType::UInt8, Value::UInt8(_))
        | (FieldType::UInt16, Value::UInt16(_))
        | (FieldType::UInt32, Value::UInt32(_))
        | (FieldType::UInt64, Value::UInt64(_))
        | (FieldType::Float32, Value::Float32(_))
        | (FieldType::Float64, Value::Float64(_))
        | (FieldType::String, Value::String(_)) => Ok(()),

        (FieldType::Enum(def), Value::Enum(n)) => {
            if def.contains(*n) {
                Ok(())
            } else {
                Err(ValidationError::EnumOutOfRange {
                    path: path.to_string(),
                    enum_name: def.name.clone(),
                    value: *n,
                })
            }
        }

        (FieldType::FixedArray { elem, len }, Value::Array(items)) => {
            if items.len() != *len {
                return Err(ValidationError::ArrayLengthMismatch {
                    path: path.to_string(),
                    expected: *len,
                    actual: items.len(),
                });
            }
            validate_items(elem, items, resolver, path)
        }

        (FieldType::Sequence { elem }, Value::Array(items)) => {
            validate_items(elem, items, resolver, path)
        }

        (FieldType::Nested { schema }, value) => {
            let nested = resolver
                .resolve(schema)
                .ok_or_else(|| ValidationError::UnresolvedSchema {
                    path: path.to_string(),
                    name: schema.clone(),
                })?;
            validate_message(nested, value, resolver, path)
        }

        (expected, found) => Err(ValidationError::TypeMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            found: found.type_name().to_string(),
        }),
    }
}

fn validate_items(
    elem: &FieldType,
    items: &[Value],
    resolver: &dyn SchemaResolver,
    path: &str,
) -> Result<(), ValidationError> {
    for (i, item) in items.iter().enumerate() {
        validate_field(elem, item, resolver, &join_index(path, i))?;
    }
    Ok(())
}

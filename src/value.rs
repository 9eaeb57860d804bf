//! Runtime values
//!
//! A [`Value`] is a dynamically typed instance of data conforming to one
//! schema. Messages map field names to values; conformance is checked by
//! [`Schema::validate`](crate::schema::Schema::validate).

use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::schema::{FieldType, Schema, SchemaResolver};

/// Field name to value mapping of a message
pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// Enum member, held as its underlying integer
    Enum(i64),
    /// Elements of a fixed array or sequence
    Array(Vec<Value>),
    Message(Fields),
}

impl Value {
    /// Build a message value from `(field, value)` pairs
    pub fn message<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Message(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Get a field of a message value
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Message(fields) => fields.get(field),
            _ => None,
        }
    }

    pub fn as_fields(&self) -> Option<&Fields> {
        match self {
            Value::Message(fields) => Some(fields),
            _ => None,
        }
    }

    /// Short runtime type label used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt8(_) => "uint8",
            Value::UInt16(_) => "uint16",
            Value::UInt32(_) => "uint32",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Array(_) => "array",
            Value::Message(_) => "message",
        }
    }

    /// Convert a JSON document into a value of the given message schema
    ///
    /// Enum members may be given by name or by integer value.
    pub fn from_json(
        json: &serde_json::Value,
        schema: &Schema,
        resolver: &dyn SchemaResolver,
    ) -> Result<Value, ValidationError> {
        message_from_json(json, schema, resolver, "")
    }

    /// Convert into JSON, rendering enum members by their integer value
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Bool(b) => json!(b),
            Value::Int8(n) => json!(n),
            Value::Int16(n) => json!(n),
            Value::Int32(n) => json!(n),
            Value::Int64(n) => json!(n),
            Value::UInt8(n) => json!(n),
            Value::UInt16(n) => json!(n),
            Value::UInt32(n) => json!(n),
            Value::UInt64(n) => json!(n),
            Value::Float32(n) => json!(n),
            Value::Float64(n) => json!(n),
            Value::String(s) => json!(s),
            Value::Enum(n) => json!(n),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Message(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Append a field name to a value path
pub(crate) fn join_field(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

/// Append an element index to a value path
pub(crate) fn join_index(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &FieldType, json: &serde_json::Value) -> ValidationError {
    ValidationError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: json_type_name(json).to_string(),
    }
}

fn message_from_json(
    json: &serde_json::Value,
    schema: &Schema,
    resolver: &dyn SchemaResolver,
    path: &str,
) -> Result<Value, ValidationError> {
    let object = json.as_object().ok_or_else(|| ValidationError::TypeMismatch {
        path: path.to_string(),
        expected: schema.name.clone(),
        found: json_type_name(json).to_string(),
    })?;

    let mut fields = Fields::new();
    for (name, item) in object {
        let field_path = join_field(path, name);
        let def = schema
            .field(name)
            .ok_or_else(|| ValidationError::UnknownField {
                path: field_path.clone(),
                schema: schema.name.clone(),
            })?;
        fields.insert(
            name.clone(),
            field_from_json(item, &def.field_type, resolver, &field_path)?,
        );
    }
    Ok(Value::Message(fields))
}

/// Convert a JSON literal into a value of `field_type`
pub(crate) fn field_from_json(
    json: &serde_json::Value,
    field_type: &FieldType,
    resolver: &dyn SchemaResolver,
    path: &str,
) -> Result<Value, ValidationError> {
    let out_of_range = || mismatch(path, field_type, json);

    let value = match field_type {
        FieldType::Bool => Value::Bool(json.as_bool().ok_or_else(out_of_range)?),
        FieldType::Int8 => Value::Int8(int_from_json(json).ok_or_else(out_of_range)?),
        FieldType::Int16 => Value::Int16(int_from_json(json).ok_or_else(out_of_range)?),
        FieldType::Int32 => Value::Int32(int_from_json(json).ok_or_else(out_of_range)?),
        FieldType::Int64 => Value::Int64(json.as_i64().ok_or_else(out_of_range)?),
        FieldType::UInt8 => Value::UInt8(uint_from_json(json).ok_or_else(out_of_range)?),
        FieldType::UInt16 => Value::UInt16(uint_from_json(json).ok_or_else(out_of_range)?),
        FieldType::UInt32 => Value::UInt32(uint_from_json(json).ok_or_else(out_of_range)?),
        FieldType::UInt64 => Value::UInt64(json.as_u64().ok_or_else(out_of_range)?),
        FieldType::Float32 => Value::Float32(json.as_f64().ok_or_else(out_of_range)? as f32),
        FieldType::Float64 => Value::Float64(json.as_f64().ok_or_else(out_of_range)?),
        FieldType::String => Value::String(json.as_str().ok_or_else(out_of_range)?.to_string()),
        FieldType::Enum(def) => {
            let n = match json {
                serde_json::Value::String(name) => {
                    def.value_of(name).ok_or_else(|| ValidationError::TypeMismatch {
                        path: path.to_string(),
                        expected: field_type.to_string(),
                        found: format!("unknown member '{}'", name),
                    })?
                }
                other => other.as_i64().ok_or_else(out_of_range)?,
            };
            Value::Enum(n)
        }
        FieldType::FixedArray { elem, .. } | FieldType::Sequence { elem } => {
            let items = json.as_array().ok_or_else(out_of_range)?;
            Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| field_from_json(item, elem, resolver, &join_index(path, i)))
                    .collect::<Result<_, _>>()?,
            )
        }
        FieldType::Nested { schema } => {
            let nested = resolver
                .resolve(schema)
                .ok_or_else(|| ValidationError::UnresolvedSchema {
                    path: path.to_string(),
                    name: schema.clone(),
                })?;
            message_from_json(json, nested, resolver, path)?
        }
    };
    Ok(value)
}

fn int_from_json<T: TryFrom<i64>>(json: &serde_json::Value) -> Option<T> {
    json.as_i64().and_then(|n| T::try_from(n).ok())
}

fn uint_from_json<T: TryFrom<u64>>(json: &serde_json::Value) -> Option<T> {
    json.as_u64().and_then(|n| T::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDef, FieldDef, IntKind};
    use std::collections::HashMap;

    fn mapping_request() -> Schema {
        Schema::message(
            "amr/srv/Mapping_Request",
            vec![
                FieldDef::new(
                    "command",
                    FieldType::Enum(EnumDef::new(
                        "MappingCommand",
                        IntKind::UInt8,
                        &[("START_MAPPING", 0), ("STOP_MAPPING", 1)],
                    )),
                ),
                FieldDef::new("map_name", FieldType::String),
            ],
        )
    }

    #[test]
    fn test_from_json_enum_by_name() {
        let resolver: HashMap<String, Schema> = HashMap::new();
        let value = Value::from_json(
            &serde_json::json!({ "command": "STOP_MAPPING", "map_name": "floor2" }),
            &mapping_request(),
            &resolver,
        )
        .unwrap();
        assert_eq!(value.get("command"), Some(&Value::Enum(1)));
        assert_eq!(value.get("map_name"), Some(&Value::from("floor2")));
    }

    #[test]
    fn test_from_json_rejects_out_of_range_integer() {
        let schema = Schema::message("b/msg/B", vec![FieldDef::new("pct", FieldType::UInt8)]);
        let resolver: HashMap<String, Schema> = HashMap::new();
        let err = Value::from_json(&serde_json::json!({ "pct": 300 }), &schema, &resolver)
            .unwrap_err();
        assert_eq!(err.path(), "pct");
    }

    #[test]
    fn test_to_json() {
        let value = Value::message([
            ("percentage", Value::UInt8(87)),
            ("is_charging", Value::Bool(true)),
        ]);
        assert_eq!(
            value.to_json(),
            serde_json::json!({ "percentage": 87, "is_charging": true })
        );
    }

    #[test]
    fn test_paths() {
        assert_eq!(join_field("", "pose"), "pose");
        assert_eq!(join_field("pose", "x"), "pose.x");
        assert_eq!(join_index("points", 3), "points[3]");
    }
}

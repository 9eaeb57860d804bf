//! Type hashes for interface integrity
//!
//! Every registered schema gets a SHA-256 fingerprint over a canonical
//! description of its fields. Nested references contribute the hash of the
//! referenced interface, so a change anywhere below a schema changes its hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::schema::{FieldType, Schema};

/// Prefix identifying the hashing scheme
pub const TYPE_HASH_PREFIX: &str = "RIHS01_";

/// SHA-256 type hash of a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeHash(String);

impl TypeHash {
    /// Hash raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{}{:x}", TYPE_HASH_PREFIX, hash))
    }

    /// Hash a schema; `nested` supplies hashes of referenced interfaces
    pub fn of_schema<F>(schema: &Schema, nested: F) -> Self
    where
        F: Fn(&str) -> Option<TypeHash>,
    {
        Self::from_bytes(canonical_description(schema, &nested).as_bytes())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex digest without the scheme prefix
    pub fn digest(&self) -> &str {
        self.0.strip_prefix(TYPE_HASH_PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TypeHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One line for the header, one per field in declaration order
fn canonical_description<F>(schema: &Schema, nested: &F) -> String
where
    F: Fn(&str) -> Option<TypeHash>,
{
    let mut out = format!("{} {}\n", schema.kind, schema.name);
    for field in &schema.fields {
        out.push_str(&field.name);
        out.push(' ');
        out.push_str(&canonical_type(&field.field_type, nested));
        if field.default.is_some() {
            out.push_str(" =");
        }
        out.push('\n');
    }
    out
}

fn canonical_type<F>(field_type: &FieldType, nested: &F) -> String
where
    F: Fn(&str) -> Option<TypeHash>,
{
    match field_type {
        FieldType::Enum(def) => {
            let members: Vec<String> = def
                .values
                .iter()
                .map(|v| format!("{}={}", v.name, v.value))
                .collect();
            format!("enum {}:{}{{{}}}", def.name, def.repr, members.join(","))
        }
        FieldType::FixedArray { elem, len } => format!("{}[{}]", canonical_type(elem, nested), len),
        FieldType::Sequence { elem } => format!("{}[]", canonical_type(elem, nested)),
        FieldType::Nested { schema } => match nested(schema) {
            Some(hash) => format!("{}@{}", schema, hash.digest()),
            None => schema.clone(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;

    fn battery(pct: FieldType) -> Schema {
        Schema::message(
            "amr/msg/BatteryInfo",
            vec![
                FieldDef::new("percentage", pct),
                FieldDef::new("is_charging", FieldType::Bool),
            ],
        )
    }

    #[test]
    fn test_hash_consistency() {
        let a = TypeHash::of_schema(&battery(FieldType::UInt8), |_| None);
        let b = TypeHash::of_schema(&battery(FieldType::UInt8), |_| None);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with(TYPE_HASH_PREFIX));
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_hash_tracks_field_types() {
        let a = TypeHash::of_schema(&battery(FieldType::UInt8), |_| None);
        let b = TypeHash::of_schema(&battery(FieldType::Float32), |_| None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_tracks_nested_hash() {
        let status = Schema::message(
            "amr/msg/Status",
            vec![FieldDef::new("battery", FieldType::nested("amr/msg/BatteryInfo"))],
        );
        let h1 = TypeHash::of_schema(&status, |_| Some(TypeHash::from_bytes(b"one")));
        let h2 = TypeHash::of_schema(&status, |_| Some(TypeHash::from_bytes(b"two")));
        assert_ne!(h1, h2);
    }
}

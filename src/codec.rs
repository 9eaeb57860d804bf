//! Binary codec
//!
//! Canonical wire layout for values conforming to a schema:
//!
//! - fields are written in declaration order, with no tags or padding
//! - integers and floats are fixed-width little-endian
//! - `bool` is one byte, `0` or `1`
//! - strings are a `u32` little-endian byte count followed by UTF-8 bytes
//! - sequences are a `u32` little-endian element count followed by the elements
//! - fixed arrays are their elements only, the length comes from the schema
//! - nested messages are encoded inline
//! - enums are encoded as their underlying integer
//!
//! A length prefix that asks for more bytes than the whole input holds, or
//! more elements than the configured limits allow, is a `LengthOverflow`.
//! Input that simply ends early is an `UnexpectedEof`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, ValidationError};
use crate::schema::{FieldType, IntKind, Schema, SchemaResolver};
use crate::value::{join_field, join_index, Fields, Value};

/// Upper bounds applied to length prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    /// Maximum element count of a sequence
    pub max_sequence_len: usize,
    /// Maximum byte length of a string
    pub max_string_len: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_sequence_len: 1 << 20,
            max_string_len: 16 << 20,
        }
    }
}

/// Encoder/decoder bound to a schema resolver
///
/// Holds no mutable state; share it freely across threads.
#[derive(Clone, Copy)]
pub struct Codec<'r> {
    resolver: &'r dyn SchemaResolver,
    limits: CodecLimits,
}

impl<'r> Codec<'r> {
    pub fn new(resolver: &'r dyn SchemaResolver) -> Self {
        Self {
            resolver,
            limits: CodecLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> CodecLimits {
        self.limits
    }

    /// Validate `value` against `schema` and encode it
    pub fn encode(&self, value: &Value, schema: &Schema) -> Result<Bytes, CodecError> {
        schema.validate(value, self.resolver)?;
        let mut buf = BytesMut::with_capacity(self.min_message_size(schema));
        self.write_message(&mut buf, value, schema, "")?;
        Ok(buf.freeze())
    }

    /// Decode exactly one value of `schema` from `bytes`
    pub fn decode(&self, bytes: &[u8], schema: &Schema) -> Result<Value, CodecError> {
        let mut reader = Reader::new(bytes);
        let value = self.read_message(&mut reader, schema, "")?;
        if reader.remaining() > 0 {
            return Err(CodecError::TrailingBytes {
                schema: schema.name.clone(),
                count: reader.remaining(),
            });
        }
        Ok(value)
    }

    // ========== Encoding ==========

    fn write_message(
        &self,
        buf: &mut BytesMut,
        value: &Value,
        schema: &Schema,
        path: &str,
    ) -> Result<(), CodecError> {
        let fields = value.as_fields().ok_or_else(|| mismatch(path, &schema.name, value))?;
        for def in &schema.fields {
            let field_path = join_field(path, &def.name);
            let field_value = fields
                .get(&def.name)
                .or(def.default.as_ref())
                .ok_or_else(|| ValidationError::FieldMissing {
                    path: field_path.clone(),
                })?;
            self.write_field(buf, &def.field_type, field_value, &field_path)?;
        }
        Ok(())
    }

    fn write_field(
        &self,
        buf: &mut BytesMut,
        field_type: &FieldType,
        value: &Value,
        path: &str,
    ) -> Result<(), CodecError> {
        match (field_type, value) {
            (FieldType::Enum(def), Value::Enum(n)) => {
                put_int(buf, def.repr, *n);
                Ok(())
            }
            (FieldType::FixedArray { elem, .. }, Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.write_field(buf, elem, item, &join_index(path, i))?;
                }
                Ok(())
            }
            (FieldType::Sequence { elem }, Value::Array(items)) => {
                put_len(buf, items.len(), self.limits.max_sequence_len, path)?;
                for (i, item) in items.iter().enumerate() {
                    self.write_field(buf, elem, item, &join_index(path, i))?;
                }
                Ok(())
            }
            (FieldType::Nested { schema }, value) => {
                let nested = self.resolve(schema, path)?;
                self.write_message(buf, value, nested, path)
            }
            (_, value) => self.write_scalar(buf, field_type, value, path),
        }
    }

    fn write_scalar(
        &self,
        buf: &mut BytesMut,
        field_type: &FieldType,
        value: &Value,
        path: &str,
    ) -> Result<(), CodecError> {
        match value {
            Value::Bool(b) => buf.put_u8(u8::from(*b)),
            Value::Int8(n) => buf.put_i8(*n),
            Value::Int16(n) => buf.put_i16_le(*n),
            Value::Int32(n) => buf.put_i32_le(*n),
            Value::Int64(n) => buf.put_i64_le(*n),
            Value::UInt8(n) => buf.put_u8(*n),
            Value::UInt16(n) => buf.put_u16_le(*n),
            Value::UInt32(n) => buf.put_u32_le(*n),
            Value::UInt64(n) => buf.put_u64_le(*n),
            Value::Float32(n) => buf.put_f32_le(*n),
            Value::Float64(n) => buf.put_f64_le(*n),
            Value::String(s) => {
                put_len(buf, s.len(), self.limits.max_string_len, path)?;
                buf.put_slice(s.as_bytes());
            }
            other => return Err(mismatch(path, &field_type.to_string(), other)),
        }
        Ok(())
    }

    // ========== Decoding ==========

    fn read_message(&self, reader: &mut Reader<'_>, schema: &Schema, path: &str) -> Result<Value, CodecError> {
        let mut fields = Fields::new();
        for def in &schema.fields {
            let field_path = join_field(path, &def.name);
            let value = self.read_field(reader, &def.field_type, &field_path)?;
            fields.insert(def.name.clone(), value);
        }
        Ok(Value::Message(fields))
    }

    fn read_field(&self, reader: &mut Reader<'_>, field_type: &FieldType, path: &str) -> Result<Value, CodecError> {
        let value = match field_type {
            FieldType::Bool => match reader.read_u8(path)? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                byte => {
                    return Err(CodecError::InvalidBool {
                        path: path.to_string(),
                        byte,
                    })
                }
            },
            FieldType::Int8 => Value::Int8(reader.take(1, path)?.get_i8()),
            FieldType::Int16 => Value::Int16(reader.take(2, path)?.get_i16_le()),
            FieldType::Int32 => Value::Int32(reader.take(4, path)?.get_i32_le()),
            FieldType::Int64 => Value::Int64(reader.take(8, path)?.get_i64_le()),
            FieldType::UInt8 => Value::UInt8(reader.read_u8(path)?),
            FieldType::UInt16 => Value::UInt16(reader.take(2, path)?.get_u16_le()),
            FieldType::UInt32 => Value::UInt32(reader.take(4, path)?.get_u32_le()),
            FieldType::UInt64 => Value::UInt64(reader.take(8, path)?.get_u64_le()),
            FieldType::Float32 => Value::Float32(reader.take(4, path)?.get_f32_le()),
            FieldType::Float64 => Value::Float64(reader.take(8, path)?.get_f64_le()),
            FieldType::String => {
                let len = reader.read_len(1, self.limits.max_string_len, path)?;
                let raw = reader.take(len, path)?;
                let s = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8 {
                    path: path.to_string(),
                })?;
                Value::String(s.to_string())
            }
            FieldType::Enum(def) => {
                let n = read_int(reader, def.repr, path)?;
                if !def.contains(n) {
                    return Err(CodecError::InvalidEnum {
                        path: path.to_string(),
                        enum_name: def.name.clone(),
                        value: n,
                    });
                }
                Value::Enum(n)
            }
            FieldType::FixedArray { elem, len } => {
                let mut items = Vec::with_capacity(*len);
                for i in 0..*len {
                    items.push(self.read_field(reader, elem, &join_index(path, i))?);
                }
                Value::Array(items)
            }
            FieldType::Sequence { elem } => {
                let min = self.min_size(elem);
                let len = reader.read_len(min, self.limits.max_sequence_len, path)?;
                let mut items = Vec::with_capacity(len.min(reader.remaining()));
                for i in 0..len {
                    items.push(self.read_field(reader, elem, &join_index(path, i))?);
                }
                Value::Array(items)
            }
            FieldType::Nested { schema } => {
                let nested = self.resolve(schema, path)?;
                self.read_message(reader, nested, path)?
            }
        };
        Ok(value)
    }

    // ========== Helpers ==========

    fn resolve(&self, name: &str, path: &str) -> Result<&'r Schema, CodecError> {
        self.resolver
            .resolve(name)
            .ok_or_else(|| CodecError::UnresolvedSchema {
                path: path.to_string(),
                name: name.to_string(),
            })
    }

    fn min_size(&self, field_type: &FieldType) -> usize {
        min_encoded_size(field_type, self.resolver)
    }

    fn min_message_size(&self, schema: &Schema) -> usize {
        schema
            .fields
            .iter()
            .fold(0usize, |acc, f| acc.saturating_add(self.min_size(&f.field_type)))
    }
}

/// Smallest possible encoding of a value of `field_type`
///
/// Unresolved nested schemas count as zero bytes.
pub(crate) fn min_encoded_size(field_type: &FieldType, resolver: &dyn SchemaResolver) -> usize {
    match field_type {
        FieldType::Bool | FieldType::Int8 | FieldType::UInt8 => 1,
        FieldType::Int16 | FieldType::UInt16 => 2,
        FieldType::Int32 | FieldType::UInt32 | FieldType::Float32 => 4,
        FieldType::Int64 | FieldType::UInt64 | FieldType::Float64 => 8,
        FieldType::String | FieldType::Sequence { .. } => 4,
        FieldType::Enum(def) => def.repr.width(),
        FieldType::FixedArray { elem, len } => min_encoded_size(elem, resolver).saturating_mul(*len),
        FieldType::Nested { schema } => resolver
            .resolve(schema)
            .map(|s| {
                s.fields.iter().fold(0usize, |acc, f| {
                    acc.saturating_add(min_encoded_size(&f.field_type, resolver))
                })
            })
            .unwrap_or(0),
    }
}

fn mismatch(path: &str, expected: &str, found: &Value) -> CodecError {
    CodecError::Validation(ValidationError::TypeMismatch {
        path: path.to_string(),
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    })
}

fn put_len(buf: &mut BytesMut, len: usize, limit: usize, path: &str) -> Result<(), CodecError> {
    let limit = limit.min(u32::MAX as usize);
    if len > limit {
        return Err(CodecError::LengthOverflow {
            path: path.to_string(),
            length: len,
            limit,
        });
    }
    buf.put_u32_le(len as u32);
    Ok(())
}

/// Enum values are range-checked at registration, so the casts are lossless
fn put_int(buf: &mut BytesMut, repr: IntKind, n: i64) {
    match repr {
        IntKind::Int8 => buf.put_i8(n as i8),
        IntKind::Int16 => buf.put_i16_le(n as i16),
        IntKind::Int32 => buf.put_i32_le(n as i32),
        IntKind::Int64 => buf.put_i64_le(n),
        IntKind::UInt8 => buf.put_u8(n as u8),
        IntKind::UInt16 => buf.put_u16_le(n as u16),
        IntKind::UInt32 => buf.put_u32_le(n as u32),
        IntKind::UInt64 => buf.put_u64_le(n as u64),
    }
}

fn read_int(reader: &mut Reader<'_>, repr: IntKind, path: &str) -> Result<i64, CodecError> {
    let mut raw = reader.take(repr.width(), path)?;
    let n = match repr {
        IntKind::Int8 => i64::from(raw.get_i8()),
        IntKind::Int16 => i64::from(raw.get_i16_le()),
        IntKind::Int32 => i64::from(raw.get_i32_le()),
        IntKind::Int64 => raw.get_i64_le(),
        IntKind::UInt8 => i64::from(raw.get_u8()),
        IntKind::UInt16 => i64::from(raw.get_u16_le()),
        IntKind::UInt32 => i64::from(raw.get_u32_le()),
        // Values above i64::MAX wrap negative and can never match a member
        IntKind::UInt64 => raw.get_u64_le() as i64,
    };
    Ok(n)
}

/// Bounds-checked cursor over the input
struct Reader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            total: buf.len(),
        }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Split off the next `n` bytes
    fn take(&mut self, n: usize, path: &str) -> Result<&'a [u8], CodecError> {
        if self.buf.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                path: path.to_string(),
                needed: n,
                available: self.buf.remaining(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn read_u8(&mut self, path: &str) -> Result<u8, CodecError> {
        Ok(self.take(1, path)?.get_u8())
    }

    /// Read a `u32` count prefix for items of at least `min_item_size` bytes
    ///
    /// Zero-width items are charged one byte each, so a count can never
    /// exceed the input length.
    fn read_len(&mut self, min_item_size: usize, limit: usize, path: &str) -> Result<usize, CodecError> {
        let len = self.take(4, path)?.get_u32_le() as usize;
        let width = min_item_size.max(1);
        if len > limit || len.saturating_mul(width) > self.total {
            let bound = limit.min(self.total / width);
            return Err(CodecError::LengthOverflow {
                path: path.to_string(),
                length: len,
                limit: bound,
            });
        }
        Ok(len)
    }
}

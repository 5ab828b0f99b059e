//! Primitive scalar codec.
//!
//! Primitives are the leaves of every object graph: the closed set of
//! scalar types the engine can encode directly. Everything else is a
//! container, a nested record, or a foreign reference, and is handled
//! a layer up by the graph codec.

use crate::error::{CodecError, CodecResult};
use crate::reader::RecordReader;
use crate::writer::RecordWriter;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// The closed set of primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 64-bit float.
    F64,
    /// UTF-8 string.
    Text,
    /// Raw byte blob.
    Bytes,
    /// 128-bit GUID.
    Guid,
    /// UTC timestamp, millisecond precision.
    DateTime,
}

impl PrimitiveKind {
    /// All primitive kinds, in stable order.
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Bool,
        PrimitiveKind::I32,
        PrimitiveKind::I64,
        PrimitiveKind::F64,
        PrimitiveKind::Text,
        PrimitiveKind::Bytes,
        PrimitiveKind::Guid,
        PrimitiveKind::DateTime,
    ];

    /// The wire-level type name for this kind.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::I32 => "i32",
            PrimitiveKind::I64 => "i64",
            PrimitiveKind::F64 => "f64",
            PrimitiveKind::Text => "string",
            PrimitiveKind::Bytes => "bytes",
            PrimitiveKind::Guid => "guid",
            PrimitiveKind::DateTime => "datetime",
        }
    }

    /// Resolves a type name back to a kind.
    ///
    /// This is the `can_encode` check: a name that resolves is a
    /// primitive the codec can handle directly.
    #[must_use]
    pub fn for_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }
}

/// A primitive scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Boolean.
    Bool(bool),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 64-bit float.
    F64(f64),
    /// UTF-8 string.
    Text(String),
    /// Raw byte blob.
    Bytes(Vec<u8>),
    /// 128-bit GUID.
    Guid(Uuid),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
}

impl Primitive {
    /// Returns this value's kind.
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::Bool(_) => PrimitiveKind::Bool,
            Primitive::I32(_) => PrimitiveKind::I32,
            Primitive::I64(_) => PrimitiveKind::I64,
            Primitive::F64(_) => PrimitiveKind::F64,
            Primitive::Text(_) => PrimitiveKind::Text,
            Primitive::Bytes(_) => PrimitiveKind::Bytes,
            Primitive::Guid(_) => PrimitiveKind::Guid,
            Primitive::DateTime(_) => PrimitiveKind::DateTime,
        }
    }

    /// Returns this value's wire-level type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind().type_name()
    }

    /// Encodes this value's raw payload bytes.
    ///
    /// The payload is not self-describing; the surrounding record
    /// carries the type id that selects the kind on decode.
    pub fn encode(&self, w: &mut RecordWriter) {
        match self {
            Primitive::Bool(v) => w.put_u8(u8::from(*v)),
            Primitive::I32(v) => w.put_i32(*v),
            Primitive::I64(v) => w.put_i64(*v),
            Primitive::F64(v) => w.put_f64(*v),
            Primitive::Text(v) => w.put_string(v),
            Primitive::Bytes(v) => w.put_blob(v),
            Primitive::Guid(v) => w.put_blob(v.as_bytes()),
            Primitive::DateTime(v) => w.put_i64(v.timestamp_millis()),
        }
    }

    /// Decodes a payload of the given kind.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or an out-of-range payload.
    pub fn decode(kind: PrimitiveKind, r: &mut RecordReader<'_>) -> CodecResult<Self> {
        match kind {
            PrimitiveKind::Bool => match r.get_u8()? {
                0 => Ok(Primitive::Bool(false)),
                1 => Ok(Primitive::Bool(true)),
                other => Err(CodecError::invalid_format(format!(
                    "invalid bool payload: {other}"
                ))),
            },
            PrimitiveKind::I32 => Ok(Primitive::I32(r.get_i32()?)),
            PrimitiveKind::I64 => Ok(Primitive::I64(r.get_i64()?)),
            PrimitiveKind::F64 => Ok(Primitive::F64(r.get_f64()?)),
            PrimitiveKind::Text => Ok(Primitive::Text(r.get_string()?)),
            PrimitiveKind::Bytes => Ok(Primitive::Bytes(r.get_blob()?)),
            PrimitiveKind::Guid => {
                let bytes = r.get_blob()?;
                let arr: [u8; 16] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CodecError::invalid_format("guid payload is not 16 bytes"))?;
                Ok(Primitive::Guid(Uuid::from_bytes(arr)))
            }
            PrimitiveKind::DateTime => {
                let millis = r.get_i64()?;
                let dt = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| CodecError::invalid_format("timestamp out of range"))?;
                Ok(Primitive::DateTime(dt))
            }
        }
    }

    /// Decodes a payload by its wire-level type name.
    ///
    /// # Errors
    ///
    /// Returns `CannotHandle` when the name is not a primitive type,
    /// plus the decode failures of the resolved kind.
    pub fn decode_named(type_name: &str, r: &mut RecordReader<'_>) -> CodecResult<Self> {
        let kind = PrimitiveKind::for_type_name(type_name)
            .ok_or_else(|| CodecError::cannot_handle(type_name))?;
        Self::decode(kind, r)
    }

    /// Returns true if the codec can encode values of the named type.
    #[must_use]
    pub fn can_encode(type_name: &str) -> bool {
        PrimitiveKind::for_type_name(type_name).is_some()
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Primitive::Bool(v) => write!(f, "{v}"),
            Primitive::I32(v) => write!(f, "{v}"),
            Primitive::I64(v) => write!(f, "{v}"),
            Primitive::F64(v) => write!(f, "{v}"),
            Primitive::Text(v) => write!(f, "{v}"),
            Primitive::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Primitive::Guid(v) => write!(f, "{v}"),
            Primitive::DateTime(v) => write!(f, "{v}"),
        }
    }
}
